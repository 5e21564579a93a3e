use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// How a received chain of equal length is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForkChoice {
    /// Adopt only strictly longer valid chains.
    #[default]
    Longest,
    /// As `Longest`; on equal length prefer more cumulative validations,
    /// then the lexicographically smaller tip hash.
    LongestThenWeight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_min_validations")]
    pub min_validations_required: usize,

    #[serde(default = "default_max_authorities")]
    pub max_authorities: usize,

    /// Pending blocks older than this are abandoned by `prune_expired`.
    /// `None` keeps pending blocks forever.
    #[serde(default)]
    pub pending_ttl_secs: Option<u64>,

    #[serde(default)]
    pub fork_choice: ForkChoice,
}

fn default_min_validations() -> usize {
    1
}

fn default_max_authorities() -> usize {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_validations_required: default_min_validations(),
            max_authorities: default_max_authorities(),
            pending_ttl_secs: None,
            fork_choice: ForkChoice::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.min_validations_required == 0 {
            return Err(LedgerError::Misconfigured(
                "min_validations_required must be > 0".to_string(),
            ));
        }
        if self.max_authorities == 0 {
            return Err(LedgerError::Misconfigured(
                "max_authorities must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pending_ttl(&self) -> Option<Duration> {
        self.pending_ttl_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(Duration::seconds)
    }
}

/// Who this node is; recorded in snapshots and status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub node_id: String,
    pub node_name: String,
    /// Address recorded on the genesis authority.
    pub node_address: String,
}

impl NodeIdentity {
    pub fn new(node_id: impl Into<String>, node_name: impl Into<String>, node_address: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            node_name: node_name.into(),
            node_address: node_address.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_source_ledger() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.min_validations_required, 1);
        assert_eq!(cfg.max_authorities, 10);
        assert!(cfg.pending_ttl().is_none());
        assert_eq!(cfg.fork_choice, ForkChoice::Longest);
    }

    #[test]
    fn zero_quorum_is_rejected() {
        let cfg = EngineConfig { min_validations_required: 0, ..EngineConfig::default() };
        assert!(matches!(cfg.validate(), Err(LedgerError::Misconfigured(_))));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"fork_choice":"longest_then_weight"}"#).unwrap();
        assert_eq!(cfg.fork_choice, ForkChoice::LongestThenWeight);
        assert_eq!(cfg.max_authorities, 10);
    }
}

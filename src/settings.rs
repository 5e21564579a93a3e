// NODE CONFIGURATION
// Optional TOML file, layered under POA_* environment variables,
// then overridden by command-line flags in the binary

use ::config::{Config, Environment, File, FileFormat};
use poa_consensus::{EngineConfig, NodeIdentity};
use poa_core::GENESIS_AUTHORITY_ID;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8333";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Source(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Defaults to `node-{port}` of the listen address.
    #[serde(default)]
    pub node_id: String,

    #[serde(default = "default_node_name")]
    pub node_name: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub bootstrap_peers: Vec<String>,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Authority the console acts as for `submit`.
    #[serde(default = "default_authority_id")]
    pub authority_id: String,

    #[serde(default)]
    pub consensus: EngineConfig,
}

fn default_node_name() -> String {
    "PoA Node".to_string()
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_authority_id() -> String {
    GENESIS_AUTHORITY_ID.to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            node_name: default_node_name(),
            listen_addr: default_listen_addr(),
            bootstrap_peers: Vec::new(),
            data_dir: default_data_dir(),
            authority_id: default_authority_id(),
            consensus: EngineConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Read `path` (if given and present) and `POA_*` variables, e.g.
    /// `POA_LISTEN_ADDR` or `POA_CONSENSUS__MIN_VALIDATIONS_REQUIRED`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("POA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("bootstrap_peers"),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Fill derived defaults and check the result.
    pub fn finish(mut self) -> Result<Self, ConfigError> {
        if self.node_id.trim().is_empty() {
            let port = self
                .listen_addr
                .rsplit(':')
                .next()
                .filter(|p| !p.is_empty())
                .unwrap_or("0");
            self.node_id = format!("node-{}", port);
        }
        self.consensus
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if self.listen_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("listen_addr is empty".to_string()));
        }
        Ok(self)
    }

    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity::new(&self.node_id, &self.node_name, &self.listen_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_follows_listen_port() {
        let cfg = NodeConfig {
            listen_addr: "0.0.0.0:9100".into(),
            ..NodeConfig::default()
        }
        .finish()
        .unwrap();
        assert_eq!(cfg.node_id, "node-9100");
    }

    #[test]
    fn explicit_node_id_is_kept() {
        let cfg = NodeConfig {
            node_id: "clerk-office".into(),
            ..NodeConfig::default()
        }
        .finish()
        .unwrap();
        assert_eq!(cfg.node_id, "clerk-office");
        assert_eq!(cfg.identity().node_address, DEFAULT_LISTEN_ADDR);
    }

    #[test]
    fn zero_quorum_is_invalid() {
        let mut cfg = NodeConfig::default();
        cfg.consensus.min_validations_required = 0;
        assert!(matches!(cfg.finish(), Err(ConfigError::Invalid(_))));
    }
}

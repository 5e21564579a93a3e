use chrono::{DateTime, Utc};
use poa_core::{Authority, Block};
use serde::{Deserialize, Serialize};

/// Full ledger state of one node, as written to durable storage.
///
/// SAFETY: A snapshot is the only durable copy of the pending pool;
/// it must be written whole, never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub node_id: String,
    pub node_name: String,
    pub authorities: Vec<Authority>,
    pub chain: Vec<Block>,
    #[serde(default)]
    pub pending_blocks: Vec<Block>,
    pub min_validations_required: usize,
    pub last_saved: DateTime<Utc>,
}

impl LedgerSnapshot {
    pub fn chain_length(&self) -> usize {
        self.chain.len()
    }

    pub fn active_authorities(&self) -> usize {
        self.authorities.iter().filter(|a| a.is_active).count()
    }
}

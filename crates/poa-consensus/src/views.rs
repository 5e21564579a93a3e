//! Read-only projections handed to dashboards and audit displays.

use chrono::{DateTime, Utc};
use poa_core::{Authority, Block};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct RegistryView {
    pub total_authorities: usize,
    pub active_authorities: usize,
    pub inactive_authorities: usize,
    pub active_ids: Vec<String>,
    pub inactive_ids: Vec<String>,
    pub authorities: Vec<Authority>,
    pub blocks_in_chain: usize,
    pub pending_blocks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockView {
    pub block: Block,
    pub validation_count: usize,
    pub validators: Vec<String>,
    pub is_finalized: bool,
    pub finalized_at: Option<DateTime<Utc>>,
    /// Creator's current registry record, if known locally
    pub creator: Option<Authority>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub node_name: String,
    pub chain_length: usize,
    pub pending_blocks: usize,
    pub tip_hash: Option<String>,
    pub latest_block: Option<u64>,
    pub active_authorities: usize,
    pub min_validations_required: usize,
}

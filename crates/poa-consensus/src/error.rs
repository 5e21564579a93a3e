use poa_core::{BlockError, ChainFault};
use poa_state::StoreError;
use thiserror::Error;

/// Failure of a ledger operation, with a human-readable reason.
///
/// SAFETY: Every engine operation reports failure through this type;
/// nothing on the operation path panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("{0} is not an authority")]
    UnknownAuthority(String),

    #[error("authority {0} is not active")]
    InactiveAuthority(String),

    #[error("authority {0} is protected and cannot be revoked")]
    ProtectedAuthority(String),

    #[error("authority registry is full ({max} authorities)")]
    CapacityExceeded { max: usize },

    #[error("authority {validator_id} already validated block #{index}")]
    DuplicateValidation { index: u64, validator_id: String },

    #[error("block #{0} is not pending")]
    BlockNotPending(u64),

    /// Quorum was reached but the block does not extend the current tail;
    /// the validation is kept and finalization deferred.
    #[error("block #{index} links to {previous_hash}, chain tail is #{tail_index} {tail_hash}; finalization deferred")]
    ChainAdvanced {
        index: u64,
        previous_hash: String,
        tail_index: u64,
        tail_hash: String,
    },

    #[error("invalid chain: {0}")]
    InvalidChain(#[from] ChainFault),

    #[error("block type {0} is reserved for the ledger")]
    ReservedBlockType(String),

    #[error("ledger already has a genesis block")]
    GenesisExists,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("misconfigured engine: {0}")]
    Misconfigured(String),
}

impl LedgerError {
    /// Errors that are reported after the in-memory state already changed.
    pub fn state_changed(&self) -> bool {
        matches!(self, LedgerError::ChainAdvanced { .. })
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        LedgerError::StorageUnavailable(err.to_string())
    }
}

impl From<BlockError> for LedgerError {
    fn from(err: BlockError) -> Self {
        match err {
            BlockError::AlreadyFinalized { index } => LedgerError::BlockNotPending(index),
            BlockError::DuplicateValidation { index, validator_id } => {
                LedgerError::DuplicateValidation { index, validator_id }
            }
        }
    }
}

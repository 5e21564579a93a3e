use poa_consensus::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Frame that is oversized or not a known JSON message.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("message encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("network I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("peer {0} is not connected")]
    NotConnected(String),

    #[error("outbound queue to {0} is full")]
    QueueFull(String),

    #[error("connected to ourselves")]
    SelfConnection,

    /// A blocking ledger call panicked or was cancelled.
    #[error("ledger task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

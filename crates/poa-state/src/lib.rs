//! Durable snapshots of a node's ledger state.
//!
//! Every save rewrites the whole snapshot; there is no append-only log.

pub mod snapshot;
pub mod store;

pub use snapshot::LedgerSnapshot;
pub use store::{JsonFileStore, MemoryStore, SnapshotStore, StoreError};

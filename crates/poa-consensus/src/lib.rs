pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod views;

pub use config::{EngineConfig, ForkChoice, NodeIdentity};
pub use engine::ConsensusEngine;
pub use error::LedgerError;
pub use ledger::{AbandonReason, AbandonedBlock, Grant, Ledger, ValidationOutcome};
pub use views::{BlockView, NodeStatus, RegistryView};

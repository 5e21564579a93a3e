// === Ledger Data Model ===
pub mod authority;
pub mod block;
pub mod chain;

// === Re-exports for broader ecosystem access ===
pub use authority::Authority;
pub use block::{Block, BlockError, Payload, Validation};
pub use chain::{cumulative_validations, verify_chain, verify_extension, ChainFault};

/// Id of the bootstrap authority created with every fresh ledger.
pub const GENESIS_AUTHORITY_ID: &str = "GENESIS_AUTH";

/// Display name of the bootstrap authority.
pub const GENESIS_AUTHORITY_NAME: &str = "Genesis Authority";

/// Key material recorded for the bootstrap authority.
pub const GENESIS_PUBLIC_KEY: &str = "GENESIS_PUBLIC_KEY";

/// `granted_by` sentinel for the root of the grant tree.
pub const SYSTEM_GRANTER: &str = "SYSTEM";

/// Previous-hash sentinel carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Payload `type` values written by the engine itself.
pub mod block_types {
    pub const GENESIS: &str = "GENESIS";
    pub const AUTHORITY_GRANT: &str = "AUTHORITY_GRANT";
    pub const AUTHORITY_REVOKE: &str = "AUTHORITY_REVOKE";
}

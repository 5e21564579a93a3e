pub mod console;
pub mod logging;
pub mod node;
pub mod settings;

pub use logging::init_logging;
pub use node::{LedgerNode, NodeError};
pub use settings::{ConfigError, NodeConfig};

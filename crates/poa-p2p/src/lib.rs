pub mod error;
pub mod message;
pub mod node;
pub mod peer;

pub use error::SyncError;
pub use message::{frame_codec, WireMessage, MAX_FRAME_LEN};
pub use node::SyncNode;
pub use peer::{Direction, PeerInfo, PeerManager};

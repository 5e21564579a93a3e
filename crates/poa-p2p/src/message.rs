// WIRE PROTOCOL
// Peer messages carried as length-prefixed JSON frames
//
// SAFETY INVARIANTS:
// 1. Every frame is a 4-byte big-endian length followed by that many bytes
// 2. Frames over MAX_FRAME_LEN are refused before they are buffered
// 3. A frame that does not decode to a known message is malformed;
//    the connection carrying it is dropped, nothing else is affected

use bytes::Bytes;
use poa_core::Block;
use serde::{Deserialize, Serialize};
use tokio_util::codec::LengthDelimitedCodec;

use crate::error::SyncError;

/// Largest frame accepted from a peer (a full chain travels in one frame).
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Sent by both sides when a connection opens.
    Hello { node_id: String, chain_length: usize },
    /// The sender's full finalized chain.
    Chain { blocks: Vec<Block> },
    /// One block the sender just finalized.
    NewBlock { block: Block },
}

impl WireMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Hello { .. } => "hello",
            WireMessage::Chain { .. } => "chain",
            WireMessage::NewBlock { .. } => "new_block",
        }
    }

    pub fn encode(&self) -> Result<Bytes, SyncError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(frame: &[u8]) -> Result<Self, SyncError> {
        serde_json::from_slice(frame).map_err(|err| SyncError::MalformedMessage(err.to_string()))
    }
}

pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use serde_json::json;
    use tokio_util::codec::{Decoder, Encoder};

    #[test]
    fn hello_uses_flat_tagged_json() {
        let hello = WireMessage::Hello {
            node_id: "node-a".into(),
            chain_length: 3,
        };
        let value: serde_json::Value = serde_json::from_slice(&hello.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "hello", "node_id": "node-a", "chain_length": 3})
        );
    }

    #[test]
    fn unknown_or_broken_frames_are_malformed() {
        let frames: [&[u8]; 3] = [b"nope!", br#"{"type":"gossip"}"#, br#"{"type":"hello"}"#];
        for frame in frames {
            assert!(matches!(
                WireMessage::decode(frame),
                Err(SyncError::MalformedMessage(_))
            ));
        }
    }

    #[test]
    fn codec_prefixes_big_endian_length() {
        let mut codec = frame_codec();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"{}"), &mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 2, b'{', b'}']);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"{}");
    }

    #[test]
    fn oversized_frame_is_refused() {
        let mut codec = frame_codec();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes());
        assert!(codec.decode(&mut buf).is_err());
    }
}

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, warn};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::message::WireMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// What is known about one connected peer.
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub address: String,
    /// Learned from the peer's `hello`
    pub node_id: Option<String>,
    pub chain_length: Option<usize>,
    pub direction: Direction,
    pub connected_at: DateTime<Utc>,
}

/// A live connection: its outbound queue and the token that closes it.
pub(crate) struct PeerHandle {
    pub(crate) info: PeerInfo,
    pub(crate) outbound: mpsc::Sender<WireMessage>,
    pub(crate) closer: CancellationToken,
    pub(crate) connection_id: u64,
}

/// Connected peers keyed by socket address.
///
/// SAFETY: Entries are only ever touched through short synchronous calls;
/// no map guard is held across an await point.
#[derive(Default)]
pub struct PeerManager {
    peers: DashMap<String, PeerHandle>,
}

impl PeerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. A previous connection under the same
    /// address is closed.
    pub(crate) fn insert(&self, handle: PeerHandle) {
        let address = handle.info.address.clone();
        if let Some(previous) = self.peers.insert(address.clone(), handle) {
            debug!("Replacing connection to {}", address);
            previous.closer.cancel();
        }
    }

    /// Drop a peer and close its connection.
    pub fn remove(&self, address: &str) -> Option<PeerInfo> {
        self.peers.remove(address).map(|(_, handle)| {
            handle.closer.cancel();
            handle.info
        })
    }

    /// Remove the entry only if it still belongs to `connection_id`.
    pub(crate) fn release(&self, address: &str, connection_id: u64) {
        self.peers
            .remove_if(address, |_, handle| handle.connection_id == connection_id);
    }

    pub fn contains(&self, address: &str) -> bool {
        self.peers.contains_key(address)
    }

    pub(crate) fn record_hello(&self, address: &str, node_id: &str, chain_length: usize) {
        if let Some(mut handle) = self.peers.get_mut(address) {
            handle.info.node_id = Some(node_id.to_string());
            handle.info.chain_length = Some(chain_length);
        }
    }

    /// Queue a message for one peer without waiting.
    pub fn send(&self, address: &str, message: WireMessage) -> Result<(), SyncError> {
        let handle = self
            .peers
            .get(address)
            .ok_or_else(|| SyncError::NotConnected(address.to_string()))?;
        match handle.outbound.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SyncError::QueueFull(address.to_string())),
            Err(TrySendError::Closed(_)) => Err(SyncError::NotConnected(address.to_string())),
        }
    }

    /// Queue a message for every peer. Returns how many accepted it.
    pub fn broadcast(&self, message: &WireMessage) -> usize {
        let mut delivered = 0;
        for entry in self.peers.iter() {
            match entry.outbound.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => warn!(
                    "Dropping {} for {}: {}",
                    message.kind(),
                    entry.key(),
                    err
                ),
            }
        }
        delivered
    }

    pub fn list(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self.peers.iter().map(|e| e.info.clone()).collect();
        peers.sort_by(|a, b| a.address.cmp(&b.address));
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Close every connection.
    pub fn clear(&self) {
        for entry in self.peers.iter() {
            entry.closer.cancel();
        }
        self.peers.clear();
    }
}

// SYNC NODE
// Listener, per-peer connection tasks and block propagation
//
// SAFETY INVARIANTS:
// 1. Each connection sends `hello` before anything else
// 2. A received chain replaces the local one only through the engine's
//    fork-choice and verification rules
// 3. A failing connection (I/O error, malformed frame, peer hang-up) is
//    closed and forgotten; the node and other peers carry on
// 4. Nothing reconnects on its own; `connect` is always caller-initiated

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use parking_lot::Mutex;
use poa_consensus::{ConsensusEngine, LedgerError};
use poa_core::Block;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::message::{frame_codec, WireMessage};
use crate::peer::{Direction, PeerHandle, PeerInfo, PeerManager};

const OUTBOUND_QUEUE: usize = 64;

/// Network front of one ledger node. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncNode {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Arc<ConsensusEngine>,
    node_id: String,
    peers: PeerManager,
    shutdown: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
    next_connection: AtomicU64,
}

impl SyncNode {
    pub fn new(engine: Arc<ConsensusEngine>) -> Self {
        let node_id = engine.identity().node_id;
        Self {
            inner: Arc::new(Inner {
                engine,
                node_id,
                peers: PeerManager::new(),
                shutdown: CancellationToken::new(),
                local_addr: Mutex::new(None),
                next_connection: AtomicU64::new(1),
            }),
        }
    }

    pub fn engine(&self) -> &Arc<ConsensusEngine> {
        &self.inner.engine
    }

    /// Bind the listener and start accepting peers and announcing blocks
    /// this node finalizes.
    pub async fn start(&self, listen_addr: &str) -> Result<SocketAddr, SyncError> {
        let listener = TcpListener::bind(listen_addr).await?;
        let local = listener.local_addr()?;
        *self.inner.local_addr.lock() = Some(local);
        info!("Node {} listening on {}", self.inner.node_id, local);

        let finalized = self.inner.engine.subscribe_finalized();
        tokio::spawn(self.clone().announce_finalized(finalized));
        tokio::spawn(self.clone().accept_loop(listener));
        Ok(local)
    }

    /// Dial a peer. Connecting to an address already connected is a no-op.
    pub async fn connect(&self, address: &str) -> Result<(), SyncError> {
        if self.inner.peers.contains(address) {
            debug!("Already connected to {}", address);
            return Ok(());
        }
        let stream = TcpStream::connect(address).await?;
        info!("Connected to peer {}", address);
        self.spawn_connection(stream, address.to_string(), Direction::Outbound);
        Ok(())
    }

    /// Close the connection to `address`. Returns whether it was connected.
    pub fn disconnect(&self, address: &str) -> bool {
        let removed = self.inner.peers.remove(address).is_some();
        if removed {
            info!("Disconnected from {}", address);
        }
        removed
    }

    /// Queue a message for every connected peer.
    pub fn broadcast(&self, message: WireMessage) -> usize {
        self.inner.peers.broadcast(&message)
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        self.inner.peers.list()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock()
    }

    /// Stop the listener and close every connection.
    pub fn shutdown(&self) {
        info!("Node {} shutting down", self.inner.node_id);
        self.inner.shutdown.cancel();
        self.inner.peers.clear();
    }

    /// Resolves once `shutdown` has been called.
    pub async fn stopped(&self) {
        self.inner.shutdown.cancelled().await
    }

    fn hello(&self) -> WireMessage {
        WireMessage::Hello {
            node_id: self.inner.node_id.clone(),
            chain_length: self.inner.engine.chain_length(),
        }
    }

    async fn accept_loop(self, listener: TcpListener) {
        loop {
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        info!("Accepted peer {}", remote);
                        self.spawn_connection(stream, remote.to_string(), Direction::Inbound);
                    }
                    Err(err) => warn!("Failed to accept connection: {}", err),
                },
            }
        }
        debug!("Listener for {} closed", self.inner.node_id);
    }

    async fn announce_finalized(self, mut finalized: broadcast::Receiver<Block>) {
        loop {
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                received = finalized.recv() => match received {
                    Ok(block) => {
                        let index = block.index();
                        let sent = self.broadcast(WireMessage::NewBlock { block });
                        debug!("Announced block #{} to {} peer(s)", index, sent);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Skipped announcing {} finalized block(s)", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, address: String, direction: Direction) {
        let connection_id = self.inner.next_connection.fetch_add(1, Ordering::Relaxed);
        let (outbound, queue) = mpsc::channel(OUTBOUND_QUEUE);
        let closer = self.inner.shutdown.child_token();

        self.inner.peers.insert(PeerHandle {
            info: PeerInfo {
                address: address.clone(),
                node_id: None,
                chain_length: None,
                direction,
                connected_at: Utc::now(),
            },
            outbound: outbound.clone(),
            closer: closer.clone(),
            connection_id,
        });
        if outbound.try_send(self.hello()).is_err() {
            warn!("Could not queue hello for {}", address);
        }
        drop(outbound);

        let node = self.clone();
        tokio::spawn(async move {
            match node.run_connection(stream, &address, queue, closer).await {
                Ok(()) => info!("Connection to {} closed", address),
                Err(SyncError::MalformedMessage(reason)) => {
                    warn!("Dropping {}: malformed message: {}", address, reason)
                }
                Err(SyncError::SelfConnection) => info!("Dropping {}: it is this node", address),
                Err(err) => info!("Connection to {} ended: {}", address, err),
            }
            node.inner.peers.release(&address, connection_id);
        });
    }

    async fn run_connection(
        &self,
        stream: TcpStream,
        address: &str,
        mut queue: mpsc::Receiver<WireMessage>,
        closer: CancellationToken,
    ) -> Result<(), SyncError> {
        let (mut sink, mut frames) = Framed::new(stream, frame_codec()).split();

        let writer = async {
            while let Some(message) = queue.recv().await {
                sink.send(message.encode()?).await?;
            }
            Ok::<(), SyncError>(())
        };

        let reader = async {
            while let Some(frame) = frames.next().await {
                let frame = frame.map_err(|err| match err.kind() {
                    std::io::ErrorKind::InvalidData => SyncError::MalformedMessage(err.to_string()),
                    _ => SyncError::Io(err),
                })?;
                let message = WireMessage::decode(&frame)?;
                self.handle_message(address, message).await?;
            }
            Ok::<(), SyncError>(())
        };

        tokio::select! {
            _ = closer.cancelled() => Ok(()),
            result = writer => result,
            result = reader => result,
        }
    }

    /// Peer chains and blocks are applied on the blocking pool: the engine
    /// writes its snapshot while holding the ledger lock.
    async fn handle_message(&self, address: &str, message: WireMessage) -> Result<(), SyncError> {
        debug!("Received {} from {}", message.kind(), address);
        match message {
            WireMessage::Hello {
                node_id,
                chain_length,
            } => {
                if node_id == self.inner.node_id {
                    return Err(SyncError::SelfConnection);
                }
                self.inner.peers.record_hello(address, &node_id, chain_length);
                let local_length = self.inner.engine.chain_length();
                if local_length > chain_length {
                    info!(
                        "Peer {} has {} blocks, sending our {}",
                        node_id, chain_length, local_length
                    );
                    let chain = WireMessage::Chain {
                        blocks: self.inner.engine.chain(),
                    };
                    if let Err(err) = self.inner.peers.send(address, chain) {
                        warn!("Could not send chain to {}: {}", address, err);
                    }
                }
            }
            WireMessage::Chain { blocks } => {
                let offered = blocks.len();
                let engine = Arc::clone(&self.inner.engine);
                match tokio::task::spawn_blocking(move || engine.adopt_chain(blocks)).await? {
                    Ok(true) => info!("Adopted {}-block chain from {}", offered, address),
                    Ok(false) => debug!("Kept local chain over {}-block chain from {}", offered, address),
                    Err(err) => log_ledger_refusal("chain", address, err),
                }
            }
            WireMessage::NewBlock { block } => {
                let index = block.index();
                let engine = Arc::clone(&self.inner.engine);
                match tokio::task::spawn_blocking(move || engine.accept_peer_block(block)).await? {
                    Ok(true) => info!("Appended block #{} from {}", index, address),
                    Ok(false) => debug!("Ignored block #{} from {}", index, address),
                    Err(err) => log_ledger_refusal("new_block", address, err),
                }
            }
        }
        Ok(())
    }
}

/// Well-formed but unacceptable data keeps the connection open.
fn log_ledger_refusal(kind: &str, address: &str, err: LedgerError) {
    match err {
        LedgerError::StorageUnavailable(reason) => {
            warn!("Applied {} from {} but could not save: {}", kind, address, reason)
        }
        other => warn!("Refused {} from {}: {}", kind, address, other),
    }
}

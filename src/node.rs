use log::{info, warn};
use poa_consensus::{ConsensusEngine, LedgerError};
use poa_p2p::{SyncError, SyncNode};
use poa_state::{JsonFileStore, SnapshotStore, StoreError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::settings::{ConfigError, NodeConfig};

/// Upper bound on how long an expired pending block lingers.
const MAX_PRUNE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// A ledger engine, its snapshot store and its network front.
pub struct LedgerNode {
    config: NodeConfig,
    engine: Arc<ConsensusEngine>,
    sync: SyncNode,
}

impl LedgerNode {
    /// Open the node's JSON snapshot under `data_dir`.
    pub fn open(config: NodeConfig) -> Result<Self, NodeError> {
        let store = JsonFileStore::for_node(&config.data_dir, &config.node_id)?;
        Self::open_with_store(config, Arc::new(store))
    }

    pub fn open_with_store(config: NodeConfig, store: Arc<dyn SnapshotStore>) -> Result<Self, NodeError> {
        let engine = Arc::new(ConsensusEngine::open(
            config.identity(),
            config.consensus.clone(),
            store,
        )?);
        let sync = SyncNode::new(Arc::clone(&engine));
        Ok(Self {
            config,
            engine,
            sync,
        })
    }

    /// Listen, dial bootstrap peers and start the expiry sweep if a TTL is set.
    /// Unreachable bootstrap peers are logged, not fatal.
    pub async fn start(&self) -> Result<SocketAddr, NodeError> {
        let local = self.sync.start(&self.config.listen_addr).await?;
        for peer in &self.config.bootstrap_peers {
            if let Err(err) = self.sync.connect(peer).await {
                warn!("Bootstrap peer {} unreachable: {}", peer, err);
            }
        }
        if let Some(ttl) = self.config.consensus.pending_ttl_secs {
            self.spawn_expiry_sweep(Duration::from_secs(ttl).min(MAX_PRUNE_INTERVAL));
        }
        info!(
            "Node {} ({}) started with {} blocks",
            self.config.node_id,
            self.config.node_name,
            self.engine.chain_length()
        );
        Ok(local)
    }

    fn spawn_expiry_sweep(&self, every: Duration) {
        let engine = Arc::clone(&self.engine);
        let sync = self.sync.clone();
        let period = every.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = sync.stopped() => break,
                    _ = ticker.tick() => {}
                }
                match engine.prune_expired() {
                    Ok(dropped) if !dropped.is_empty() => {
                        info!("Expired {} pending block(s)", dropped.len())
                    }
                    Ok(_) => {}
                    Err(err) => warn!("Expiry sweep could not save: {}", err),
                }
            }
        });
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<ConsensusEngine> {
        &self.engine
    }

    pub fn sync(&self) -> &SyncNode {
        &self.sync
    }

    pub fn shutdown(&self) {
        self.sync.shutdown();
    }
}

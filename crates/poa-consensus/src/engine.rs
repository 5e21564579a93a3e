// CONSENSUS ENGINE
// Thread-safe front of the ledger: serialization, persistence, notification
//
// SAFETY INVARIANTS:
// 1. Every operation takes the ledger lock exactly once; no operation
//    observes another half-applied
// 2. Every state change is followed by a whole-snapshot save while the lock
//    is still held, so snapshots are written in operation order
// 3. A failed save is reported as StorageUnavailable; the in-memory change
//    stands and the next successful save carries it
// 4. Blocks finalized by this node are published on the broadcast channel,
//    even when the save that follows fails

use chrono::Utc;
use log::{debug, error, info};
use parking_lot::Mutex;
use poa_core::{Block, Payload};
use poa_state::{LedgerSnapshot, SnapshotStore};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::{EngineConfig, NodeIdentity};
use crate::error::LedgerError;
use crate::ledger::{AbandonedBlock, Grant, Ledger, ValidationOutcome};
use crate::views::{BlockView, NodeStatus, RegistryView};

const FINALIZED_CHANNEL_CAPACITY: usize = 256;

pub struct ConsensusEngine {
    ledger: Mutex<Ledger>,
    store: Arc<dyn SnapshotStore>,
    finalized_tx: broadcast::Sender<Block>,
}

impl ConsensusEngine {
    /// Engine over an empty ledger. Nothing is loaded; call `create_genesis`.
    pub fn new(
        identity: NodeIdentity,
        config: EngineConfig,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<Self, LedgerError> {
        Ok(Self::from_ledger(Ledger::new(identity, config)?, store))
    }

    /// Load the node's snapshot, or start a fresh ledger with a genesis block.
    pub fn open(
        identity: NodeIdentity,
        config: EngineConfig,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<Self, LedgerError> {
        let ledger = match store.load()? {
            Some(snapshot) => Ledger::from_snapshot(identity, config, snapshot, Utc::now())?,
            None => Ledger::new(identity, config)?,
        };
        let engine = Self::from_ledger(ledger, store);
        if engine.chain_length() == 0 {
            engine.create_genesis()?;
        }
        info!(
            "Consensus engine ready: {} blocks, {} pending, snapshot at {}",
            engine.chain_length(),
            engine.pending_blocks().len(),
            engine.store.location()
        );
        Ok(engine)
    }

    fn from_ledger(ledger: Ledger, store: Arc<dyn SnapshotStore>) -> Self {
        let (finalized_tx, _) = broadcast::channel(FINALIZED_CHANNEL_CAPACITY);
        Self {
            ledger: Mutex::new(ledger),
            store,
            finalized_tx,
        }
    }

    /// Receive every block this node finalizes from now on.
    pub fn subscribe_finalized(&self) -> broadcast::Receiver<Block> {
        self.finalized_tx.subscribe()
    }

    pub fn create_genesis(&self) -> Result<Block, LedgerError> {
        let mut ledger = self.ledger.lock();
        let result = ledger.create_genesis(Utc::now()).cloned();
        if let Ok(block) = &result {
            self.publish(block);
        }
        self.commit(&ledger, result)
    }

    pub fn grant_authority(
        &self,
        name: &str,
        public_key: &str,
        node_address: &str,
        granter_id: &str,
    ) -> Result<Grant, LedgerError> {
        let mut ledger = self.ledger.lock();
        let result = ledger.grant_authority(name, public_key, node_address, granter_id, Utc::now());
        self.commit(&ledger, result)
    }

    pub fn revoke_authority(&self, authority_id: &str, revoker_id: &str) -> Result<u64, LedgerError> {
        let mut ledger = self.ledger.lock();
        let result = ledger.revoke_authority(authority_id, revoker_id, Utc::now());
        self.commit(&ledger, result)
    }

    pub fn submit_block(&self, payload: Payload, creator_id: &str) -> Result<u64, LedgerError> {
        let mut ledger = self.ledger.lock();
        let result = ledger.submit_block(payload, creator_id, Utc::now());
        self.commit(&ledger, result)
    }

    pub fn validate_block(&self, index: u64, validator_id: &str) -> Result<ValidationOutcome, LedgerError> {
        let mut ledger = self.ledger.lock();
        let result = ledger.validate_block(index, validator_id, Utc::now());
        if let Ok(ValidationOutcome::Finalized { indices }) = &result {
            for &finalized in indices {
                if let Some(block) = ledger.chain().get(finalized as usize) {
                    self.publish(block);
                }
            }
        }
        self.commit(&ledger, result)
    }

    pub fn reject_block(&self, index: u64, authority_id: &str) -> Result<Vec<AbandonedBlock>, LedgerError> {
        let mut ledger = self.ledger.lock();
        let result = ledger.reject_block(index, authority_id, Utc::now());
        self.commit(&ledger, result)
    }

    pub fn prune_expired(&self) -> Result<Vec<AbandonedBlock>, LedgerError> {
        let mut ledger = self.ledger.lock();
        let dropped = ledger.prune_expired(Utc::now());
        if dropped.is_empty() {
            return Ok(dropped);
        }
        self.commit(&ledger, Ok(dropped))
    }

    pub fn stale_pending(&self) -> Vec<Block> {
        self.ledger.lock().stale_pending().into_iter().cloned().collect()
    }

    /// Replace the local chain with a peer's if it wins fork choice.
    pub fn adopt_chain(&self, blocks: Vec<Block>) -> Result<bool, LedgerError> {
        let mut ledger = self.ledger.lock();
        match ledger.adopt_chain(blocks, Utc::now()) {
            Ok(true) => self.commit(&ledger, Ok(true)),
            other => other,
        }
    }

    pub fn accept_peer_block(&self, block: Block) -> Result<bool, LedgerError> {
        let mut ledger = self.ledger.lock();
        match ledger.accept_peer_block(block, Utc::now()) {
            Ok(true) => self.commit(&ledger, Ok(true)),
            other => other,
        }
    }

    pub fn get_authority_stats(&self) -> RegistryView {
        self.ledger.lock().registry_view()
    }

    pub fn get_block_details(&self, index: u64) -> Option<BlockView> {
        self.ledger.lock().block_view(index)
    }

    pub fn status(&self) -> NodeStatus {
        self.ledger.lock().status()
    }

    pub fn chain(&self) -> Vec<Block> {
        self.ledger.lock().chain().to_vec()
    }

    pub fn pending_blocks(&self) -> Vec<Block> {
        self.ledger.lock().pending_blocks().to_vec()
    }

    pub fn abandoned(&self) -> Vec<AbandonedBlock> {
        self.ledger.lock().abandoned().to_vec()
    }

    pub fn chain_length(&self) -> usize {
        self.ledger.lock().chain_length()
    }

    pub fn tip_hash(&self) -> Option<String> {
        self.ledger.lock().tip_hash().map(str::to_string)
    }

    pub fn identity(&self) -> NodeIdentity {
        self.ledger.lock().identity().clone()
    }

    pub fn config(&self) -> EngineConfig {
        self.ledger.lock().config().clone()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.lock().to_snapshot(Utc::now())
    }

    /// Persist after a state change. Errors flagged as `state_changed`
    /// still save, since the ledger moved before the error was raised.
    fn commit<T>(&self, ledger: &Ledger, result: Result<T, LedgerError>) -> Result<T, LedgerError> {
        match result {
            Ok(value) => {
                self.persist(ledger)?;
                Ok(value)
            }
            Err(err) if err.state_changed() => {
                self.persist(ledger)?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    fn persist(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        self.store
            .save(&ledger.to_snapshot(Utc::now()))
            .map_err(|err| {
                error!("Failed to save ledger to {}: {}", self.store.location(), err);
                LedgerError::from(err)
            })
    }

    fn publish(&self, block: &Block) {
        if self.finalized_tx.send(block.clone()).is_err() {
            debug!("No subscribers for finalized block #{}", block.index());
        }
    }
}

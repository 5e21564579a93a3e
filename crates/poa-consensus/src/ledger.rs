// PROOF-OF-AUTHORITY LEDGER
// Authority registry, pending pool and finalized chain of one node
//
// SAFETY INVARIANTS:
// 1. The genesis authority can never be revoked
// 2. Only active authorities create, validate or reject blocks
// 3. An authority validates a given block at most once
// 4. A block joins the chain only when it has quorum, its previous_hash is
//    the chain tail hash and its index equals the chain length
// 5. The pending pool is one linked sequence rooted at the chain tail;
//    blocks that fall off it are moved to the abandoned log, never kept
// 6. Finalized blocks are never mutated
// 7. A grant or revocation that is abandoned before reaching the chain
//    leaves no registry effect behind

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use poa_core::block_types::{AUTHORITY_GRANT, AUTHORITY_REVOKE, GENESIS};
use poa_core::{
    cumulative_validations, verify_chain, verify_extension, Authority, Block, ChainFault, Payload,
    GENESIS_AUTHORITY_ID, GENESIS_AUTHORITY_NAME, GENESIS_PREVIOUS_HASH,
};
use poa_state::LedgerSnapshot;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::{EngineConfig, ForkChoice, NodeIdentity};
use crate::error::LedgerError;
use crate::views::{BlockView, NodeStatus, RegistryView};

/// Abandoned blocks kept in memory for operators to inspect or resubmit.
const ABANDONED_HISTORY: usize = 256;

/// Result of a successful `validate_block`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// Validation recorded, quorum not yet reached.
    Recorded { index: u64, count: usize, required: usize },
    /// The block and any pending successors that were ready joined the chain.
    Finalized { indices: Vec<u64> },
}

/// A newly granted authority and the pending block recording the grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub authority_id: String,
    pub block_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbandonReason {
    Rejected { by: String },
    Expired,
    /// No longer extends the chain tail.
    Orphaned,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbandonedBlock {
    pub block: Block,
    pub reason: AbandonReason,
    pub abandoned_at: DateTime<Utc>,
}

/// Registry change carried in a finalized block's payload.
enum RegistryRecord {
    Grant(Authority),
    Revoke(String),
}

/// Single-node ledger state. All operations are synchronous and lock-free;
/// callers serialize access (see `ConsensusEngine`).
#[derive(Debug, Clone)]
pub struct Ledger {
    identity: NodeIdentity,
    config: EngineConfig,
    authorities: Vec<Authority>,
    chain: Vec<Block>,
    pending: Vec<Block>,
    abandoned: Vec<AbandonedBlock>,
}

impl Ledger {
    pub fn new(identity: NodeIdentity, config: EngineConfig) -> Result<Self, LedgerError> {
        config.validate()?;
        Ok(Ledger {
            identity,
            config,
            authorities: Vec::new(),
            chain: Vec::new(),
            pending: Vec::new(),
            abandoned: Vec::new(),
        })
    }

    /// Rebuild a ledger from a persisted snapshot.
    ///
    /// SAFETY: The stored chain is re-verified; a tampered file is refused.
    /// The snapshot's quorum overrides the configured one so a restart
    /// never changes finalization rules under pending blocks.
    pub fn from_snapshot(
        identity: NodeIdentity,
        mut config: EngineConfig,
        snapshot: LedgerSnapshot,
        at: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        if !snapshot.chain.is_empty() {
            verify_chain(&snapshot.chain)?;
        }
        if snapshot.node_id != identity.node_id {
            warn!(
                "Snapshot belongs to node {}, loading it as {}",
                snapshot.node_id, identity.node_id
            );
        }
        if snapshot.min_validations_required != config.min_validations_required {
            info!(
                "Using persisted quorum {} instead of configured {}",
                snapshot.min_validations_required, config.min_validations_required
            );
            config.min_validations_required = snapshot.min_validations_required;
        }
        config.validate()?;

        let mut ledger = Ledger {
            identity,
            config,
            authorities: snapshot.authorities,
            chain: snapshot.chain,
            pending: snapshot.pending_blocks,
            abandoned: Vec::new(),
        };
        ledger.abandon_orphans(at);
        Ok(ledger)
    }

    pub fn to_snapshot(&self, at: DateTime<Utc>) -> LedgerSnapshot {
        LedgerSnapshot {
            node_id: self.identity.node_id.clone(),
            node_name: self.identity.node_name.clone(),
            authorities: self.authorities.clone(),
            chain: self.chain.clone(),
            pending_blocks: self.pending.clone(),
            min_validations_required: self.config.min_validations_required,
            last_saved: at,
        }
    }

    /// Register the genesis authority and append the self-validated block 0.
    pub fn create_genesis(&mut self, at: DateTime<Utc>) -> Result<&Block, LedgerError> {
        if !self.chain.is_empty() {
            return Err(LedgerError::GenesisExists);
        }
        if self.authority(GENESIS_AUTHORITY_ID).is_none() {
            self.authorities
                .insert(0, Authority::genesis(self.identity.node_address.clone(), at));
        }

        let mut payload = Payload::new();
        payload.insert("type".into(), json!(GENESIS));
        payload.insert(
            "message".into(),
            json!("Genesis Block - PoA Blockchain Initialized"),
        );
        payload.insert("authorities_initialized".into(), json!(1));
        payload.insert("blockchain_started_at".into(), json!(at));

        let mut block = Block::new_at(
            0,
            payload,
            GENESIS_PREVIOUS_HASH.to_string(),
            GENESIS_AUTHORITY_ID.to_string(),
            GENESIS_AUTHORITY_NAME.to_string(),
            at,
        );
        block.add_validation(GENESIS_AUTHORITY_ID, GENESIS_AUTHORITY_NAME, at)?;
        block.finalize(1, at);
        info!("Genesis block created: {}", block.hash());

        self.chain.push(block);
        self.abandon_orphans(at);
        Ok(&self.chain[0])
    }

    /// Admit a new authority and record the grant as a pending block.
    pub fn grant_authority(
        &mut self,
        name: &str,
        public_key: &str,
        node_address: &str,
        granter_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Grant, LedgerError> {
        let granter_name = self.active_authority(granter_id)?.name.clone();
        if self.authorities.len() >= self.config.max_authorities {
            return Err(LedgerError::CapacityExceeded {
                max: self.config.max_authorities,
            });
        }

        let authority_id = self.next_authority_id(at);
        let mut payload = Payload::new();
        payload.insert("type".into(), json!(AUTHORITY_GRANT));
        payload.insert("new_authority_id".into(), json!(authority_id));
        payload.insert("new_authority_name".into(), json!(name));
        payload.insert("new_authority_public_key".into(), json!(public_key));
        payload.insert("new_authority_address".into(), json!(node_address));
        payload.insert("granted_by".into(), json!(granter_id));
        payload.insert("granted_by_name".into(), json!(granter_name));
        payload.insert("granted_at".into(), json!(at));

        self.authorities.push(Authority::new(
            authority_id.clone(),
            name.to_string(),
            public_key.to_string(),
            node_address.to_string(),
            granter_id.to_string(),
            at,
        ));
        let block_index = self.push_pending(payload, granter_id, at)?;
        info!("Authority granted: {} ({}) by {}", name, authority_id, granter_id);

        Ok(Grant {
            authority_id,
            block_index,
        })
    }

    /// Deactivate an authority and record the revocation as a pending block.
    ///
    /// SAFETY: The revocation block is created before the target is
    /// deactivated, so an authority may revoke itself.
    pub fn revoke_authority(
        &mut self,
        authority_id: &str,
        revoker_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, LedgerError> {
        if authority_id == GENESIS_AUTHORITY_ID {
            return Err(LedgerError::ProtectedAuthority(authority_id.to_string()));
        }
        let revoker_name = self.active_authority(revoker_id)?.name.clone();
        let target = self
            .authority(authority_id)
            .ok_or_else(|| LedgerError::UnknownAuthority(authority_id.to_string()))?;
        if !target.is_active {
            return Err(LedgerError::InactiveAuthority(authority_id.to_string()));
        }

        let mut payload = Payload::new();
        payload.insert("type".into(), json!(AUTHORITY_REVOKE));
        payload.insert("revoked_authority_id".into(), json!(authority_id));
        payload.insert("revoked_authority_name".into(), json!(target.name));
        payload.insert("revoked_by".into(), json!(revoker_id));
        payload.insert("revoked_by_name".into(), json!(revoker_name));
        payload.insert("revoked_at".into(), json!(at));

        let block_index = self.push_pending(payload, revoker_id, at)?;
        if let Some(target) = self.authority_mut(authority_id) {
            target.deactivate();
        }
        info!("Authority revoked: {} by {}", authority_id, revoker_id);
        Ok(block_index)
    }

    /// Queue an application block created by an active authority.
    pub fn submit_block(
        &mut self,
        payload: Payload,
        creator_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, LedgerError> {
        if let Some(kind) = payload.get("type").and_then(Value::as_str) {
            if [GENESIS, AUTHORITY_GRANT, AUTHORITY_REVOKE].contains(&kind) {
                return Err(LedgerError::ReservedBlockType(kind.to_string()));
            }
        }
        self.push_pending(payload, creator_id, at)
    }

    /// Record an authority's validation of a pending block, finalizing it
    /// (and any ready successors) once quorum is met.
    ///
    /// SAFETY: When quorum is met but the block does not extend the tail,
    /// the validation is kept and `ChainAdvanced` is returned; the block
    /// finalizes later when its predecessor does.
    pub fn validate_block(
        &mut self,
        index: u64,
        validator_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ValidationOutcome, LedgerError> {
        let validator_name = self.active_authority(validator_id)?.name.clone();
        let position = self
            .pending_position(index)
            .ok_or(LedgerError::BlockNotPending(index))?;
        let required = self.config.min_validations_required;

        let block = &mut self.pending[position];
        block.add_validation(validator_id, &validator_name, at)?;
        let count = block.validation_count();
        if let Some(validator) = self.authority_mut(validator_id) {
            validator.record_validated();
        }
        info!(
            "Block #{} validated by {} ({}/{})",
            index, validator_id, count, required
        );

        if count < required {
            return Ok(ValidationOutcome::Recorded {
                index,
                count,
                required,
            });
        }

        if position != 0 || !self.extends_tail(&self.pending[position]) {
            let block = &self.pending[position];
            return Err(LedgerError::ChainAdvanced {
                index,
                previous_hash: block.previous_hash().to_string(),
                tail_index: self.chain.len().saturating_sub(1) as u64,
                tail_hash: self.tail_hash(),
            });
        }

        Ok(ValidationOutcome::Finalized {
            indices: self.finalize_ready(at),
        })
    }

    /// Abandon a pending block. Successors that link through it are
    /// abandoned as orphans.
    pub fn reject_block(
        &mut self,
        index: u64,
        authority_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<AbandonedBlock>, LedgerError> {
        self.active_authority(authority_id)?;
        let position = self
            .pending_position(index)
            .ok_or(LedgerError::BlockNotPending(index))?;
        let dropped = self.abandon_from(
            position,
            AbandonReason::Rejected {
                by: authority_id.to_string(),
            },
            at,
        );
        info!(
            "Block #{} rejected by {}, {} pending block(s) abandoned",
            index,
            authority_id,
            dropped.len()
        );
        Ok(dropped)
    }

    /// Abandon pending blocks older than the configured TTL.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> Vec<AbandonedBlock> {
        let Some(ttl) = self.config.pending_ttl() else {
            return Vec::new();
        };
        let Some(position) = self
            .pending
            .iter()
            .position(|block| now - block.created_at() >= ttl)
        else {
            return Vec::new();
        };
        let dropped = self.abandon_from(position, AbandonReason::Expired, now);
        warn!("{} pending block(s) expired", dropped.len());
        dropped
    }

    /// Pending blocks whose quorum is met but which cannot finalize yet.
    pub fn stale_pending(&self) -> Vec<&Block> {
        let required = self.config.min_validations_required;
        self.pending
            .iter()
            .filter(|block| block.meets_quorum(required) && !self.extends_tail(block))
            .collect()
    }

    /// Replace the local chain with a peer's chain if it wins fork choice
    /// and verifies. Returns whether the chain was replaced.
    pub fn adopt_chain(&mut self, blocks: Vec<Block>, at: DateTime<Utc>) -> Result<bool, LedgerError> {
        if !self.prefers(&blocks) {
            debug!(
                "Ignoring peer chain of {} blocks (local {})",
                blocks.len(),
                self.chain.len()
            );
            return Ok(false);
        }
        verify_chain(&blocks)?;

        info!(
            "Adopting peer chain of {} blocks (local had {})",
            blocks.len(),
            self.chain.len()
        );
        self.chain = blocks;
        for position in 0..self.chain.len() {
            self.apply_registry_record(position, at);
        }
        self.abandon_orphans(at);
        Ok(true)
    }

    /// Append a single finalized block from a peer if it extends the tail.
    /// Blocks for another position or fork are ignored.
    pub fn accept_peer_block(&mut self, block: Block, at: DateTime<Utc>) -> Result<bool, LedgerError> {
        let Some(tip) = self.chain.last() else {
            return Ok(false);
        };
        match verify_extension(tip, &block) {
            Ok(()) => {}
            Err(ChainFault::IndexGap { .. }) | Err(ChainFault::BrokenLink { .. }) => {
                debug!("Peer block #{} does not extend local tail", block.index());
                return Ok(false);
            }
            Err(fault) => return Err(fault.into()),
        }

        info!("Peer block #{} appended: {}", block.index(), block.hash());
        self.chain.push(block);
        self.apply_registry_record(self.chain.len() - 1, at);
        self.abandon_orphans(at);
        Ok(true)
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn pending_blocks(&self) -> &[Block] {
        &self.pending
    }

    pub fn abandoned(&self) -> &[AbandonedBlock] {
        &self.abandoned
    }

    pub fn authorities(&self) -> &[Authority] {
        &self.authorities
    }

    pub fn authority(&self, authority_id: &str) -> Option<&Authority> {
        self.authorities
            .iter()
            .find(|a| a.authority_id == authority_id)
    }

    pub fn chain_length(&self) -> usize {
        self.chain.len()
    }

    pub fn tip_hash(&self) -> Option<&str> {
        self.chain.last().map(Block::hash)
    }

    /// Look a block up in the chain, then in the pending pool.
    pub fn block(&self, index: u64) -> Option<&Block> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.chain.get(i))
            .or_else(|| self.pending.iter().find(|b| b.index() == index))
    }

    pub fn registry_view(&self) -> RegistryView {
        let (active, inactive): (Vec<&Authority>, Vec<&Authority>) =
            self.authorities.iter().partition(|a| a.is_active);
        RegistryView {
            total_authorities: self.authorities.len(),
            active_authorities: active.len(),
            inactive_authorities: inactive.len(),
            active_ids: active.iter().map(|a| a.authority_id.clone()).collect(),
            inactive_ids: inactive.iter().map(|a| a.authority_id.clone()).collect(),
            authorities: self.authorities.clone(),
            blocks_in_chain: self.chain.len(),
            pending_blocks: self.pending.len(),
        }
    }

    pub fn block_view(&self, index: u64) -> Option<BlockView> {
        let block = self.block(index)?;
        Some(BlockView {
            validation_count: block.validation_count(),
            validators: block.validator_names(),
            is_finalized: block.is_finalized(),
            finalized_at: block.finalized_at(),
            creator: self.authority(block.creator_id()).cloned(),
            block: block.clone(),
        })
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            node_id: self.identity.node_id.clone(),
            node_name: self.identity.node_name.clone(),
            chain_length: self.chain.len(),
            pending_blocks: self.pending.len(),
            tip_hash: self.tip_hash().map(str::to_string),
            latest_block: self.chain.last().map(Block::index),
            active_authorities: self.authorities.iter().filter(|a| a.is_active).count(),
            min_validations_required: self.config.min_validations_required,
        }
    }

    fn active_authority(&self, authority_id: &str) -> Result<&Authority, LedgerError> {
        let authority = self
            .authority(authority_id)
            .ok_or_else(|| LedgerError::UnknownAuthority(authority_id.to_string()))?;
        if !authority.is_active {
            return Err(LedgerError::InactiveAuthority(authority_id.to_string()));
        }
        Ok(authority)
    }

    fn authority_mut(&mut self, authority_id: &str) -> Option<&mut Authority> {
        self.authorities
            .iter_mut()
            .find(|a| a.authority_id == authority_id)
    }

    fn next_authority_id(&self, at: DateTime<Utc>) -> String {
        let base = format!("AUTH_{}_{}", self.authorities.len(), at.timestamp());
        let mut candidate = base.clone();
        let mut suffix = 1;
        while self.authority(&candidate).is_some() {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        candidate
    }

    fn tail_hash(&self) -> String {
        self.tip_hash().unwrap_or(GENESIS_PREVIOUS_HASH).to_string()
    }

    fn extends_tail(&self, block: &Block) -> bool {
        block.index() == self.chain.len() as u64
            && self.tip_hash().unwrap_or(GENESIS_PREVIOUS_HASH) == block.previous_hash()
    }

    fn pending_position(&self, index: u64) -> Option<usize> {
        self.pending.iter().position(|b| b.index() == index)
    }

    fn push_pending(
        &mut self,
        payload: Payload,
        creator_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, LedgerError> {
        let creator_name = self.active_authority(creator_id)?.name.clone();
        let (index, previous_hash) = match self.pending.last() {
            Some(last) => (last.index() + 1, last.hash().to_string()),
            None => (self.chain.len() as u64, self.tail_hash()),
        };

        let block = Block::new_at(
            index,
            payload,
            previous_hash,
            creator_id.to_string(),
            creator_name,
            at,
        );
        if let Some(creator) = self.authority_mut(creator_id) {
            creator.record_created();
        }
        info!("Block #{} created by {}: {}", index, creator_id, block.hash());
        self.pending.push(block);
        Ok(index)
    }

    /// Move every ready block from the head of the pending pool to the chain.
    fn finalize_ready(&mut self, at: DateTime<Utc>) -> Vec<u64> {
        let required = self.config.min_validations_required;
        let mut finalized = Vec::new();
        while let Some(head) = self.pending.first() {
            if !head.meets_quorum(required) || !self.extends_tail(head) {
                break;
            }
            let mut block = self.pending.remove(0);
            block.finalize(required, at);
            info!(
                "Block #{} finalized with {} validations",
                block.index(),
                block.validation_count()
            );
            finalized.push(block.index());
            self.chain.push(block);
        }
        finalized
    }

    /// Drop the tail of the pending pool that no longer links to the chain.
    fn abandon_orphans(&mut self, at: DateTime<Utc>) -> Vec<AbandonedBlock> {
        let mut expected_previous = self.tail_hash();
        let mut expected_index = self.chain.len() as u64;
        let mut linked = 0;
        for block in &self.pending {
            if block.index() != expected_index
                || block.previous_hash() != expected_previous
                || !block.verify_hash()
            {
                break;
            }
            expected_previous = block.hash().to_string();
            expected_index += 1;
            linked += 1;
        }
        if linked == self.pending.len() {
            return Vec::new();
        }

        let dropped = self.abandon_from(linked, AbandonReason::Orphaned, at);
        warn!(
            "{} pending block(s) no longer extend the chain and were abandoned",
            dropped.len()
        );
        dropped
    }

    /// Remove `pending[position..]`. The first block gets `reason`, the
    /// ones linked behind it are orphans.
    fn abandon_from(
        &mut self,
        position: usize,
        reason: AbandonReason,
        at: DateTime<Utc>,
    ) -> Vec<AbandonedBlock> {
        let dropped: Vec<AbandonedBlock> = self
            .pending
            .drain(position..)
            .enumerate()
            .map(|(i, block)| AbandonedBlock {
                block,
                reason: if i == 0 { reason.clone() } else { AbandonReason::Orphaned },
                abandoned_at: at,
            })
            .collect();

        self.revert_registry_records(&dropped);
        self.abandoned.extend(dropped.iter().cloned());
        if self.abandoned.len() > ABANDONED_HISTORY {
            let excess = self.abandoned.len() - ABANDONED_HISTORY;
            self.abandoned.drain(..excess);
        }
        dropped
    }

    /// Undo the registry effect of abandoned grant and revocation blocks.
    /// Newest first, so a grant followed by a revocation of the same
    /// authority unwinds in order. Records the chain also carries stand.
    ///
    /// SAFETY: An ungranted authority is deactivated and its validations
    /// are withdrawn from the pending blocks that remain; its blocks were
    /// created after the grant and were abandoned with it.
    fn revert_registry_records(&mut self, dropped: &[AbandonedBlock]) {
        for abandoned in dropped.iter().rev() {
            match registry_record(&abandoned.block) {
                Some(RegistryRecord::Grant(granted)) => {
                    let authority_id = granted.authority_id;
                    if authority_id == GENESIS_AUTHORITY_ID
                        || self.chain_records(|record| {
                            matches!(record, RegistryRecord::Grant(a) if a.authority_id == authority_id)
                        })
                    {
                        continue;
                    }
                    if let Some(authority) = self.authority_mut(&authority_id) {
                        authority.deactivate();
                    }
                    let withdrawn = self
                        .pending
                        .iter_mut()
                        .map(|block| block.retract_validation(&authority_id))
                        .filter(|&removed| removed)
                        .count();
                    warn!(
                        "Grant of {} abandoned, authority deactivated ({} pending validation(s) withdrawn)",
                        authority_id, withdrawn
                    );
                }
                Some(RegistryRecord::Revoke(authority_id)) => {
                    if self.chain_records(|record| {
                        matches!(record, RegistryRecord::Revoke(id) if *id == authority_id)
                    }) {
                        continue;
                    }
                    if let Some(authority) = self.authority_mut(&authority_id) {
                        if authority.reactivate() {
                            warn!("Revocation of {} abandoned, authority active again", authority_id);
                        }
                    }
                }
                None => {}
            }
        }
    }

    fn chain_records(&self, wanted: impl Fn(&RegistryRecord) -> bool) -> bool {
        self.chain
            .iter()
            .filter_map(registry_record)
            .any(|record| wanted(&record))
    }

    fn prefers(&self, candidate: &[Block]) -> bool {
        if candidate.len() != self.chain.len() {
            return candidate.len() > self.chain.len();
        }
        match self.config.fork_choice {
            ForkChoice::Longest => false,
            ForkChoice::LongestThenWeight => {
                let (Some(theirs), Some(ours)) = (candidate.last(), self.chain.last()) else {
                    return false;
                };
                if theirs.hash() == ours.hash() {
                    return false;
                }
                let their_weight = cumulative_validations(candidate);
                let our_weight = cumulative_validations(&self.chain);
                their_weight > our_weight
                    || (their_weight == our_weight && theirs.hash() < ours.hash())
            }
        }
    }

    /// Mirror a finalized grant or revocation into the local registry.
    fn apply_registry_record(&mut self, position: usize, at: DateTime<Utc>) {
        let Some(record) = self.chain.get(position).and_then(registry_record) else {
            return;
        };
        match record {
            RegistryRecord::Grant(authority) => {
                if self.authority(&authority.authority_id).is_none() {
                    info!("Authority {} learned from chain", authority.authority_id);
                    self.authorities.push(authority);
                }
            }
            RegistryRecord::Revoke(authority_id) => {
                if authority_id == GENESIS_AUTHORITY_ID {
                    warn!("Ignoring on-chain revocation of the genesis authority");
                    return;
                }
                if let Some(authority) = self.authority_mut(&authority_id) {
                    if authority.deactivate() {
                        info!("Authority {} revoked by chain record at {}", authority_id, at);
                    }
                }
            }
        }
    }
}

fn registry_record(block: &Block) -> Option<RegistryRecord> {
    let payload = block.payload();
    let text = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_string);

    match block.payload_type()? {
        AUTHORITY_GRANT => {
            let granted_at = payload
                .get("granted_at")
                .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v.clone()).ok())
                .unwrap_or_else(|| block.timestamp());
            Some(RegistryRecord::Grant(Authority::new(
                text("new_authority_id")?,
                text("new_authority_name")?,
                text("new_authority_public_key")?,
                text("new_authority_address").unwrap_or_default(),
                text("granted_by").unwrap_or_else(|| block.creator_id().to_string()),
                granted_at,
            )))
        }
        AUTHORITY_REVOKE => text("revoked_authority_id").map(RegistryRecord::Revoke),
        _ => None,
    }
}

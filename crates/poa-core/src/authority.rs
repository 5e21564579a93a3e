// AUTHORITY IDENTITY
// A node or entity holding validation power on the ledger
//
// SAFETY INVARIANTS:
// 1. Every non-genesis authority names exactly one granter
// 2. Revocation only flips `is_active`; history and counters are kept
// 3. Counters only ever increase
// 4. Authorities are never physically removed from a registry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{GENESIS_AUTHORITY_ID, GENESIS_AUTHORITY_NAME, GENESIS_PUBLIC_KEY, SYSTEM_GRANTER};

/// Authoritative record of one ledger authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    /// Unique id within a ledger (`GENESIS_AUTH` or `AUTH_{n}_{unix}`)
    pub authority_id: String,

    /// Human readable name
    pub name: String,

    /// Opaque public key material
    pub public_key: String,

    /// Network address the authority's node listens on
    pub node_address: String,

    /// Id of the granting authority, or `SYSTEM` for genesis
    pub granted_by: String,

    pub granted_at: DateTime<Utc>,

    pub is_active: bool,

    /// Blocks submitted by this authority (counted at submission)
    pub blocks_created: u64,

    /// Validations contributed by this authority
    pub blocks_validated: u64,
}

impl Authority {
    pub fn new(
        authority_id: String,
        name: String,
        public_key: String,
        node_address: String,
        granted_by: String,
        granted_at: DateTime<Utc>,
    ) -> Self {
        Authority {
            authority_id,
            name,
            public_key,
            node_address,
            granted_by,
            granted_at,
            is_active: true,
            blocks_created: 0,
            blocks_validated: 0,
        }
    }

    /// The bootstrap authority rooted at `SYSTEM`.
    pub fn genesis(node_address: String, granted_at: DateTime<Utc>) -> Self {
        Authority::new(
            GENESIS_AUTHORITY_ID.to_string(),
            GENESIS_AUTHORITY_NAME.to_string(),
            GENESIS_PUBLIC_KEY.to_string(),
            node_address,
            SYSTEM_GRANTER.to_string(),
            granted_at,
        )
    }

    pub fn is_genesis(&self) -> bool {
        self.authority_id == GENESIS_AUTHORITY_ID
    }

    /// Deactivate this authority. Returns `false` if it was already inactive.
    pub fn deactivate(&mut self) -> bool {
        if !self.is_active {
            return false;
        }
        self.is_active = false;
        true
    }

    /// Undo a revocation that never reached the chain. Returns `false` if
    /// the authority was already active.
    pub fn reactivate(&mut self) -> bool {
        if self.is_active {
            return false;
        }
        self.is_active = true;
        true
    }

    pub fn record_created(&mut self) {
        self.blocks_created = self.blocks_created.saturating_add(1);
    }

    pub fn record_validated(&mut self) {
        self.blocks_validated = self.blocks_validated.saturating_add(1);
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Authority {} '{}' (active={}, created={}, validated={}, granted_by={})",
            self.authority_id,
            self.name,
            self.is_active,
            self.blocks_created,
            self.blocks_validated,
            self.granted_by
        )
    }
}

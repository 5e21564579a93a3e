// LEDGER BLOCKS
// Pending/finalized block lifecycle with tamper-evident hashing
//
// SAFETY INVARIANTS:
// 1. The hash covers index, timestamp, canonical payload, previous hash,
//    creator id and creation time; nothing else
// 2. Hashed fields are private and never mutated after construction
// 3. At most one validation per (block, validator)
// 4. Finalization happens exactly once; a finalized block accepts no
//    further validations and loses none

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;

/// Application-defined block data. Keys are kept sorted.
pub type Payload = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("block #{index} is already finalized")]
    AlreadyFinalized { index: u64 },

    #[error("authority {validator_id} already validated block #{index}")]
    DuplicateValidation { index: u64, validator_id: String },
}

/// One authority's attestation of a pending block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub validator_id: String,
    pub validator_name: String,
    pub validation_timestamp: DateTime<Utc>,
    /// Hash-derived token, not an asymmetric signature
    pub signature: String,
}

impl Validation {
    pub fn new(validator_id: String, validator_name: String, at: DateTime<Utc>) -> Self {
        let signature = Validation::signature_token(&validator_id, &at);
        Validation {
            validator_id,
            validator_name,
            validation_timestamp: at,
            signature,
        }
    }

    /// `SIG_` followed by the first 16 hex chars of SHA-256(validator_id ‖ timestamp).
    pub fn signature_token(validator_id: &str, at: &DateTime<Utc>) -> String {
        let digest = Sha256::digest(format!("{}{}", validator_id, render_time(at)).as_bytes());
        let hex = hex::encode(digest);
        format!("SIG_{}", &hex[..16])
    }
}

/// Proof-of-Authority block with its creator and validation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    index: u64,
    timestamp: DateTime<Utc>,
    payload: Payload,
    previous_hash: String,
    creator_id: String,
    creator_name: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    validations: Vec<Validation>,
    #[serde(default)]
    is_finalized: bool,
    #[serde(default)]
    finalized_at: Option<DateTime<Utc>>,
    hash: String,
}

impl Block {
    /// Create a pending block stamped with the current time.
    pub fn new(
        index: u64,
        payload: Payload,
        previous_hash: String,
        creator_id: String,
        creator_name: String,
    ) -> Self {
        Block::new_at(index, payload, previous_hash, creator_id, creator_name, Utc::now())
    }

    /// Create a pending block stamped with an explicit time.
    pub fn new_at(
        index: u64,
        payload: Payload,
        previous_hash: String,
        creator_id: String,
        creator_name: String,
        at: DateTime<Utc>,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp: at,
            payload,
            previous_hash,
            creator_id,
            creator_name,
            created_at: at,
            validations: Vec::new(),
            is_finalized: false,
            finalized_at: None,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Compute the SHA-256 content hash.
    pub fn calculate_hash(&self) -> String {
        let content = format!(
            "{}{}{}{}{}{}",
            self.index,
            render_time(&self.timestamp),
            canonical_payload(&self.payload),
            self.previous_hash,
            self.creator_id,
            render_time(&self.created_at)
        );
        hex::encode(Sha256::digest(content.as_bytes()))
    }

    /// Check the stored hash against the block contents.
    ///
    /// SAFETY: Blocks arriving from peers or disk must pass this before
    /// they are trusted; a mismatch means the content was altered.
    pub fn verify_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    /// Record a validation. Rejects finalized blocks and repeat validators.
    pub fn add_validation(
        &mut self,
        validator_id: &str,
        validator_name: &str,
        at: DateTime<Utc>,
    ) -> Result<&Validation, BlockError> {
        if self.is_finalized {
            return Err(BlockError::AlreadyFinalized { index: self.index });
        }
        if self.has_validation_from(validator_id) {
            return Err(BlockError::DuplicateValidation {
                index: self.index,
                validator_id: validator_id.to_string(),
            });
        }

        self.validations.push(Validation::new(
            validator_id.to_string(),
            validator_name.to_string(),
            at,
        ));
        let last = self.validations.len() - 1;
        Ok(&self.validations[last])
    }

    /// Withdraw a validator's attestation from a pending block. Finalized
    /// blocks keep theirs. Returns whether a validation was removed.
    pub fn retract_validation(&mut self, validator_id: &str) -> bool {
        if self.is_finalized {
            return false;
        }
        let before = self.validations.len();
        self.validations.retain(|v| v.validator_id != validator_id);
        self.validations.len() != before
    }

    pub fn has_validation_from(&self, validator_id: &str) -> bool {
        self.validations.iter().any(|v| v.validator_id == validator_id)
    }

    pub fn meets_quorum(&self, min_validations: usize) -> bool {
        self.validations.len() >= min_validations
    }

    /// Finalize if quorum is met. Returns `false` when already finalized or
    /// short of quorum, so repeated calls have no effect.
    pub fn finalize(&mut self, min_validations: usize, at: DateTime<Utc>) -> bool {
        if self.is_finalized || !self.meets_quorum(min_validations) {
            return false;
        }
        self.is_finalized = true;
        self.finalized_at = Some(at);
        true
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The payload's `type` entry, if it is a string.
    pub fn payload_type(&self) -> Option<&str> {
        self.payload.get("type").and_then(Value::as_str)
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn creator_id(&self) -> &str {
        &self.creator_id
    }

    pub fn creator_name(&self) -> &str {
        &self.creator_name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn validations(&self) -> &[Validation] {
        &self.validations
    }

    pub fn validation_count(&self) -> usize {
        self.validations.len()
    }

    pub fn validator_names(&self) -> Vec<String> {
        self.validations.iter().map(|v| v.validator_name.clone()).collect()
    }

    pub fn is_finalized(&self) -> bool {
        self.is_finalized
    }

    pub fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.finalized_at
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }
}

fn render_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Compact JSON with object keys sorted at every depth.
fn canonical_payload(payload: &Payload) -> String {
    let mut out = String::from("{");
    for (i, (key, value)) in payload.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(value, &mut out);
    }
    out.push('}');
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

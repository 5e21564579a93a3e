use chrono::{TimeZone, Utc};
use poa_consensus::{EngineConfig, Ledger, LedgerError, NodeIdentity, ValidationOutcome};
use poa_core::{verify_chain, Payload, GENESIS_AUTHORITY_ID};
use proptest::prelude::*;
use serde_json::json;

const AUTHORITIES: usize = 4;

/// Ledger with the genesis authority plus three granted ones, all grants
/// finalized under a quorum of one.
fn ledger_with_authorities(quorum: usize) -> (Ledger, Vec<String>) {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    let mut ledger = Ledger::new(
        NodeIdentity::new("prop", "Prop", "127.0.0.1:0"),
        EngineConfig::default(),
    )
    .unwrap();
    ledger.create_genesis(at).unwrap();

    let mut ids = vec![GENESIS_AUTHORITY_ID.to_string()];
    for n in 1..AUTHORITIES {
        let grant = ledger
            .grant_authority(&format!("A{}", n), "key", "addr", GENESIS_AUTHORITY_ID, at)
            .unwrap();
        ledger
            .validate_block(grant.block_index, GENESIS_AUTHORITY_ID, at)
            .unwrap();
        ids.push(grant.authority_id);
    }

    let mut snapshot = ledger.to_snapshot(at);
    snapshot.min_validations_required = quorum;
    let ledger = Ledger::from_snapshot(
        NodeIdentity::new("prop", "Prop", "127.0.0.1:0"),
        EngineConfig::default(),
        snapshot,
        at,
    )
    .unwrap();
    (ledger, ids)
}

proptest! {
    #[test]
    fn each_authority_counts_once(
        quorum in 2usize..=AUTHORITIES,
        attempts in proptest::collection::vec(0usize..AUTHORITIES, 1..24),
    ) {
        let (mut ledger, ids) = ledger_with_authorities(quorum);
        let at = Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap();
        let mut payload = Payload::new();
        payload.insert("type".into(), json!("NOTE"));
        let index = ledger.submit_block(payload, GENESIS_AUTHORITY_ID, at).unwrap();
        let base_len = ledger.chain_length();

        let mut seen = std::collections::BTreeSet::new();
        for who in attempts {
            if seen.len() >= quorum {
                // finalized: the block is no longer pending
                let result = ledger.validate_block(index, &ids[who], at);
                prop_assert_eq!(result, Err(LedgerError::BlockNotPending(index)));
                continue;
            }
            let fresh = seen.insert(who);
            match ledger.validate_block(index, &ids[who], at) {
                Ok(ValidationOutcome::Recorded { count, required, .. }) => {
                    prop_assert!(fresh);
                    prop_assert_eq!(count, seen.len());
                    prop_assert_eq!(required, quorum);
                }
                Ok(ValidationOutcome::Finalized { indices }) => {
                    prop_assert!(fresh);
                    prop_assert_eq!(seen.len(), quorum);
                    prop_assert_eq!(indices, vec![index]);
                }
                Err(LedgerError::DuplicateValidation { .. }) => prop_assert!(!fresh),
                Err(other) => prop_assert!(false, "unexpected error {}", other),
            }
        }

        let finalized = seen.len() >= quorum;
        prop_assert_eq!(ledger.chain_length(), base_len + usize::from(finalized));
        prop_assert!(verify_chain(ledger.chain()).is_ok());
        if finalized {
            prop_assert_eq!(ledger.chain().last().unwrap().validation_count(), quorum);
        }
    }
}

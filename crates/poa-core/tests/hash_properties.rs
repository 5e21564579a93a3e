use chrono::{TimeZone, Utc};
use poa_core::{verify_chain, Block, ChainFault, Payload, GENESIS_PREVIOUS_HASH};
use proptest::prelude::*;
use serde_json::json;

fn payload_from(entries: &[(String, i64)]) -> Payload {
    entries
        .iter()
        .map(|(k, v)| (k.clone(), json!(v)))
        .collect()
}

fn sealed_chain(values: &[i64]) -> Vec<Block> {
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut chain: Vec<Block> = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        let prev = chain
            .last()
            .map(|b| b.hash().to_string())
            .unwrap_or_else(|| GENESIS_PREVIOUS_HASH.to_string());
        let mut block = Block::new_at(
            i as u64,
            payload_from(&[("value".to_string(), *value)]),
            prev,
            "GENESIS_AUTH".into(),
            "Genesis Authority".into(),
            at,
        );
        block.add_validation("GENESIS_AUTH", "Genesis Authority", at).unwrap();
        block.finalize(1, at);
        chain.push(block);
    }
    chain
}

proptest! {
    #[test]
    fn hash_is_a_pure_function_of_contents(
        index in 0u64..10_000,
        secs in 0i64..2_000_000_000,
        entries in proptest::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..6),
        prev in "[0-9a-f]{64}",
        creator in "[A-Z_]{1,12}",
    ) {
        let at = Utc.timestamp_opt(secs, 0).unwrap();
        let a = Block::new_at(index, payload_from(&entries), prev.clone(), creator.clone(), "n".into(), at);
        let b = Block::new_at(index, payload_from(&entries), prev, creator, "other name".into(), at);
        prop_assert_eq!(a.calculate_hash(), a.calculate_hash());
        // creator_name is denormalized display data and not hashed
        prop_assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn changing_the_payload_changes_the_hash(value in any::<i64>(), other in any::<i64>()) {
        prop_assume!(value != other);
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let a = Block::new_at(1, payload_from(&[("v".into(), value)]), "p".into(), "c".into(), "c".into(), at);
        let b = Block::new_at(1, payload_from(&[("v".into(), other)]), "p".into(), "c".into(), "c".into(), at);
        prop_assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn every_sealed_chain_links_back_to_genesis(values in proptest::collection::vec(any::<i64>(), 1..20)) {
        let chain = sealed_chain(&values);
        prop_assert!(verify_chain(&chain).is_ok());
        for i in 1..chain.len() {
            prop_assert_eq!(chain[i].previous_hash(), chain[i - 1].hash());
        }
    }

    #[test]
    fn serde_round_trip_preserves_hash(values in proptest::collection::vec(any::<i64>(), 1..5)) {
        let chain = sealed_chain(&values);
        let raw = serde_json::to_string(&chain).unwrap();
        let back: Vec<Block> = serde_json::from_str(&raw).unwrap();
        prop_assert_eq!(&back, &chain);
        prop_assert!(verify_chain(&back).is_ok());
    }
}

#[test]
fn swapping_two_blocks_breaks_the_chain() {
    let mut chain = sealed_chain(&[1, 2, 3, 4]);
    chain.swap(1, 2);
    assert!(matches!(verify_chain(&chain), Err(ChainFault::IndexGap { position: 1, found: 2 })));
}

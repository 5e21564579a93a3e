use poa_consensus::{ConsensusEngine, EngineConfig, LedgerError, NodeIdentity};
use poa_core::{Payload, GENESIS_AUTHORITY_ID};
use poa_state::{JsonFileStore, SnapshotStore};
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

fn identity() -> NodeIdentity {
    NodeIdentity::new("node-1", "Records Office", "127.0.0.1:8333")
}

fn note(n: i64) -> Payload {
    let mut p = Payload::new();
    p.insert("type".into(), json!("NOTE"));
    p.insert("n".into(), json!(n));
    p
}

#[test]
fn fresh_directory_starts_with_genesis_on_disk() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JsonFileStore::for_node(dir.path(), "node-1").unwrap());
    let engine = ConsensusEngine::open(identity(), EngineConfig::default(), store.clone()).unwrap();

    assert_eq!(engine.chain_length(), 1);
    let snapshot = store.load().unwrap().unwrap();
    assert_eq!(snapshot.node_id, "node-1");
    assert_eq!(snapshot.chain_length(), 1);
}

#[test]
fn persisted_quorum_wins_over_config() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JsonFileStore::for_node(dir.path(), "node-1").unwrap());
    let strict = EngineConfig {
        min_validations_required: 2,
        ..EngineConfig::default()
    };
    let engine = ConsensusEngine::open(identity(), strict, store.clone()).unwrap();
    engine.submit_block(note(1), GENESIS_AUTHORITY_ID).unwrap();
    engine.validate_block(1, GENESIS_AUTHORITY_ID).unwrap();
    drop(engine);

    let reopened = ConsensusEngine::open(identity(), EngineConfig::default(), store).unwrap();
    assert_eq!(reopened.config().min_validations_required, 2);
    assert_eq!(reopened.pending_blocks().len(), 1);
    assert_eq!(reopened.pending_blocks()[0].validation_count(), 1);
}

#[test]
fn tampered_snapshot_is_refused() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JsonFileStore::for_node(dir.path(), "node-1").unwrap());
    let engine = ConsensusEngine::open(identity(), EngineConfig::default(), store.clone()).unwrap();
    engine.submit_block(note(1), GENESIS_AUTHORITY_ID).unwrap();
    engine.validate_block(1, GENESIS_AUTHORITY_ID).unwrap();
    drop(engine);

    let mut raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
    raw["chain"][1]["payload"]["n"] = json!(2);
    std::fs::write(store.path(), serde_json::to_vec(&raw).unwrap()).unwrap();

    let err = ConsensusEngine::open(identity(), EngineConfig::default(), store)
        .err()
        .unwrap();
    assert!(matches!(err, LedgerError::InvalidChain(_)), "{}", err);
}

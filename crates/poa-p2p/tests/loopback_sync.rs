use poa_consensus::{ConsensusEngine, EngineConfig, NodeIdentity};
use poa_core::{Payload, GENESIS_AUTHORITY_ID};
use poa_p2p::{SyncNode, WireMessage};
use poa_state::MemoryStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn engine(node_id: &str, blocks: usize) -> Arc<ConsensusEngine> {
    let engine = ConsensusEngine::open(
        NodeIdentity::new(node_id, node_id, "127.0.0.1:0"),
        EngineConfig::default(),
        Arc::new(MemoryStore::new()),
    )
    .unwrap();
    for n in 1..blocks {
        finalize_note(&engine, n as i64);
    }
    Arc::new(engine)
}

fn finalize_note(engine: &ConsensusEngine, n: i64) {
    let mut payload = Payload::new();
    payload.insert("type".into(), json!("NOTE"));
    payload.insert("n".into(), json!(n));
    let index = engine.submit_block(payload, GENESIS_AUTHORITY_ID).unwrap();
    engine.validate_block(index, GENESIS_AUTHORITY_ID).unwrap();
}

async fn started(node_id: &str, blocks: usize) -> (SyncNode, String) {
    let node = SyncNode::new(engine(node_id, blocks));
    let addr = node.start("127.0.0.1:0").await.unwrap();
    (node, addr.to_string())
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..150 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

#[tokio::test]
async fn shorter_node_adopts_longer_chain_on_connect() {
    init_logs();
    let (a, a_addr) = started("node-a", 3).await;
    let (b, _) = started("node-b", 5).await;

    b.connect(&a_addr).await.unwrap();

    assert!(eventually(|| a.engine().chain_length() == 5).await);
    assert_eq!(a.engine().chain(), b.engine().chain());
    a.shutdown();
    b.shutdown();
}

#[tokio::test]
async fn finalized_blocks_reach_connected_peers() {
    init_logs();
    let (a, a_addr) = started("node-a", 2).await;
    let (b, _) = started("node-b", 1).await;

    b.connect(&a_addr).await.unwrap();
    assert!(eventually(|| b.engine().chain_length() == 2).await);

    finalize_note(a.engine(), 99);
    assert!(eventually(|| b.engine().chain_length() == 3).await);
    assert_eq!(b.engine().tip_hash(), a.engine().tip_hash());
    a.shutdown();
    b.shutdown();
}

#[tokio::test]
async fn connect_is_idempotent_and_hello_is_recorded() {
    init_logs();
    let (a, a_addr) = started("node-a", 1).await;
    let (b, _) = started("node-b", 1).await;

    b.connect(&a_addr).await.unwrap();
    b.connect(&a_addr).await.unwrap();
    assert_eq!(b.peers().len(), 1);

    assert!(eventually(|| b.peers().first().and_then(|p| p.node_id.clone()).as_deref() == Some("node-a")).await);
    assert!(eventually(|| a.peers().len() == 1).await);

    assert!(b.disconnect(&a_addr));
    assert!(!b.disconnect(&a_addr));
    assert!(b.peers().is_empty());
    assert!(eventually(|| a.peers().is_empty()).await);
    a.shutdown();
    b.shutdown();
}

#[tokio::test]
async fn malformed_frame_drops_only_that_connection() {
    init_logs();
    let (a, a_addr) = started("node-a", 2).await;

    let mut raw = TcpStream::connect(&a_addr).await.unwrap();
    raw.write_all(&5u32.to_be_bytes()).await.unwrap();
    raw.write_all(b"nope!").await.unwrap();

    // the node hangs up on this connection
    let mut received = Vec::new();
    let closed = tokio::time::timeout(Duration::from_secs(3), raw.read_to_end(&mut received)).await;
    assert!(closed.is_ok(), "connection should be closed by the node");
    assert!(eventually(|| a.peers().is_empty()).await);

    // the node still serves well-behaved peers
    let (b, _) = started("node-b", 1).await;
    b.connect(&a_addr).await.unwrap();
    assert!(eventually(|| b.engine().chain_length() == 2).await);
    a.shutdown();
    b.shutdown();
}

async fn send_frame(stream: &mut TcpStream, message: &WireMessage) {
    let body = message.encode().unwrap();
    stream.write_all(&(body.len() as u32).to_be_bytes()).await.unwrap();
    stream.write_all(&body).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_chain_keeps_the_connection_open() {
    init_logs();
    let (a, a_addr) = started("node-a", 2).await;
    let longer = engine("node-b", 4).chain();
    let mut gapped = longer.clone();
    gapped.remove(2);

    let mut raw = TcpStream::connect(&a_addr).await.unwrap();
    send_frame(&mut raw, &WireMessage::Chain { blocks: gapped }).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(a.engine().chain_length(), 2);
    assert_eq!(a.peers().len(), 1);

    send_frame(&mut raw, &WireMessage::Chain { blocks: longer.clone() }).await;
    assert!(eventually(|| a.engine().chain_length() == 4).await);
    assert_eq!(a.engine().chain(), longer);
    a.shutdown();
}

#[tokio::test]
async fn connecting_to_self_is_dropped() {
    init_logs();
    let (a, a_addr) = started("node-a", 1).await;
    a.connect(&a_addr).await.unwrap();
    assert!(eventually(|| a.peers().is_empty()).await);
    a.shutdown();
}

use poa_ledger::console::{self, Command};
use poa_ledger::{LedgerNode, NodeConfig};
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

fn config_in(dir: &std::path::Path, node_id: &str) -> NodeConfig {
    NodeConfig {
        node_id: node_id.to_string(),
        listen_addr: "127.0.0.1:0".to_string(),
        data_dir: dir.to_path_buf(),
        ..NodeConfig::default()
    }
    .finish()
    .unwrap()
}

#[test]
fn toml_file_sets_node_and_consensus() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
node_id = "clerk-1"
node_name = "County Clerk"
listen_addr = "127.0.0.1:9200"
bootstrap_peers = ["127.0.0.1:9201"]

[consensus]
min_validations_required = 2
max_authorities = 5
pending_ttl_secs = 600
fork_choice = "longest_then_weight"
"#
    )
    .unwrap();

    let config = NodeConfig::load(Some(file.path())).unwrap().finish().unwrap();

    assert_eq!(config.node_id, "clerk-1");
    assert_eq!(config.node_name, "County Clerk");
    assert_eq!(config.bootstrap_peers, vec!["127.0.0.1:9201".to_string()]);
    assert_eq!(config.consensus.min_validations_required, 2);
    assert_eq!(config.consensus.max_authorities, 5);
    assert_eq!(config.consensus.pending_ttl_secs, Some(600));
}

#[test]
fn missing_config_file_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let config = NodeConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config.consensus.min_validations_required, 1);
    assert_eq!(config.consensus.max_authorities, 10);
}

#[tokio::test]
async fn console_actions_survive_restart() {
    let dir = tempdir().unwrap();

    let node = LedgerNode::open(config_in(dir.path(), "node-a")).unwrap();
    node.start().await.unwrap();

    let submit = console::parse(r#"submit {"type":"USER_REGISTRATION","user":"u-17"}"#)
        .unwrap()
        .unwrap();
    let out = console::execute(&node, submit).await.unwrap();
    assert!(out.contains("#1"), "{}", out);

    let validate = Command::Validate {
        index: 1,
        validator_id: "GENESIS_AUTH".into(),
    };
    let out = console::execute(&node, validate).await.unwrap();
    assert!(out.contains("finalized"), "{}", out);
    node.shutdown();
    drop(node);

    assert!(dir.path().join("poa_ledger_node-a.json").exists());
    let reopened = LedgerNode::open(config_in(dir.path(), "node-a")).unwrap();
    assert_eq!(reopened.engine().chain_length(), 2);
    let block = reopened.engine().get_block_details(1).unwrap();
    assert_eq!(block.block.payload_type(), Some("USER_REGISTRATION"));
    assert!(block.is_finalized);
}

#[tokio::test]
async fn console_reports_ledger_refusals() {
    let dir = tempdir().unwrap();
    let node = LedgerNode::open(config_in(dir.path(), "node-b")).unwrap();

    let revoke = console::parse("revoke GENESIS_AUTH GENESIS_AUTH").unwrap().unwrap();
    let err = console::execute(&node, revoke).await.unwrap_err();
    assert!(err.to_string().contains("protected"), "{}", err);
    assert_eq!(node.engine().pending_blocks().len(), 0);
}

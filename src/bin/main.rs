use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use poa_ledger::console::{self, Command};
use poa_ledger::{init_logging, LedgerNode, NodeConfig};
use poa_state::{JsonFileStore, SnapshotStore};

#[derive(Parser)]
#[command(name = "poa-node")]
#[command(about = "Proof-of-Authority ledger node", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node and read commands from stdin
    Run(NodeArgs),

    /// Print a summary of the persisted ledger without starting the node
    Inspect(NodeArgs),
}

#[derive(Args)]
struct NodeArgs {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:8333
    #[arg(long)]
    listen: Option<String>,

    /// Peer to connect to at startup (repeatable)
    #[arg(long = "connect")]
    connect: Vec<String>,

    #[arg(long)]
    node_id: Option<String>,

    #[arg(long)]
    node_name: Option<String>,

    #[arg(long)]
    data_dir: Option<PathBuf>,
}

impl NodeArgs {
    fn resolve(self) -> Result<NodeConfig> {
        let mut config = NodeConfig::load(self.config.as_deref())
            .context("loading node configuration")?;
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(node_id) = self.node_id {
            config.node_id = node_id;
        }
        if let Some(node_name) = self.node_name {
            config.node_name = node_name;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        config.bootstrap_peers.extend(self.connect);
        Ok(config.finish()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging("info");
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args.resolve()?).await,
        Commands::Inspect(args) => inspect(args.resolve()?),
    }
}

async fn run(config: NodeConfig) -> Result<()> {
    let node = LedgerNode::open(config).context("opening ledger")?;
    let local = node.start().await.context("starting node")?;
    info!("Node {} ready on {}", node.config().node_id, local);
    println!("{}", console::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match console::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => match console::execute(&node, command).await {
                        Ok(output) => println!("{}", output),
                        Err(err) => {
                            error!("{}", err);
                            println!("error: {}", err);
                        }
                    },
                    Err(message) => println!("{}", message),
                }
            }
        }
    }

    node.shutdown();
    info!("Node stopped");
    Ok(())
}

fn inspect(config: NodeConfig) -> Result<()> {
    let store = JsonFileStore::for_node(&config.data_dir, &config.node_id)?;
    let Some(snapshot) = store.load().context("reading snapshot")? else {
        println!("no ledger at {}", store.location());
        return Ok(());
    };

    println!("ledger of {} ({})", snapshot.node_id, snapshot.node_name);
    println!("  file: {}", store.location());
    println!("  saved: {}", snapshot.last_saved.to_rfc3339());
    println!("  chain: {} blocks", snapshot.chain_length());
    if let Some(tip) = snapshot.chain.last() {
        println!("  tip: #{} {}", tip.index(), tip.hash());
    }
    match poa_core::verify_chain(&snapshot.chain) {
        Ok(()) => println!("  integrity: ok"),
        Err(fault) => println!("  integrity: BROKEN ({})", fault),
    }
    println!("  pending: {}", snapshot.pending_blocks.len());
    println!(
        "  authorities: {} ({} active)",
        snapshot.authorities.len(),
        snapshot.active_authorities()
    );
    println!("  quorum: {}", snapshot.min_validations_required);
    Ok(())
}

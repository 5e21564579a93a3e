//! Line commands for the interactive node.

use poa_consensus::ValidationOutcome;
use poa_core::{Block, Payload};
use std::fmt::Write as _;

use crate::node::{LedgerNode, NodeError};

pub const HELP: &str = "\
Commands:
  status                               node and chain summary
  peers                                connected peers
  chain                                finalized blocks
  pending                              blocks awaiting validation
  block <index>                        one block with its validators
  authorities                          authority registry
  submit <json object>                 record an action as the console authority
  validate <index> <validator_id>      validate a pending block
  reject <index> <authority_id>        abandon a pending block
  grant <name> <key> <addr> <granter>  admit a new authority
  revoke <authority_id> <revoker_id>   deactivate an authority
  connect <host:port>                  dial a peer
  disconnect <host:port>               drop a peer
  help                                 this text
  quit                                 stop the node";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Status,
    Peers,
    Chain,
    Pending,
    Block(u64),
    Authorities,
    Submit(Payload),
    Validate { index: u64, validator_id: String },
    Reject { index: u64, authority_id: String },
    Grant {
        name: String,
        public_key: String,
        node_address: String,
        granter_id: String,
    },
    Revoke { authority_id: String, revoker_id: String },
    Connect(String),
    Disconnect(String),
    Help,
    Quit,
}

/// Parse one input line. Blank lines parse to `None`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    let command = match (word.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("status", []) => Command::Status,
        ("peers", []) => Command::Peers,
        ("chain", []) => Command::Chain,
        ("pending", []) => Command::Pending,
        ("authorities", []) => Command::Authorities,
        ("block", [index]) => Command::Block(parse_index(index)?),
        ("submit", _) if !rest.is_empty() => {
            let payload: Payload = serde_json::from_str(rest)
                .map_err(|err| format!("submit expects a JSON object: {}", err))?;
            Command::Submit(payload)
        }
        ("validate", [index, validator]) => Command::Validate {
            index: parse_index(index)?,
            validator_id: validator.to_string(),
        },
        ("reject", [index, authority]) => Command::Reject {
            index: parse_index(index)?,
            authority_id: authority.to_string(),
        },
        ("grant", [name, key, addr, granter]) => Command::Grant {
            name: name.to_string(),
            public_key: key.to_string(),
            node_address: addr.to_string(),
            granter_id: granter.to_string(),
        },
        ("revoke", [authority, revoker]) => Command::Revoke {
            authority_id: authority.to_string(),
            revoker_id: revoker.to_string(),
        },
        ("connect", [addr]) => Command::Connect(addr.to_string()),
        ("disconnect", [addr]) => Command::Disconnect(addr.to_string()),
        ("help", _) => Command::Help,
        ("quit", _) | ("stop", _) | ("exit", _) => Command::Quit,
        (other, _) => return Err(format!("unknown or incomplete command '{}', try 'help'", other)),
    };
    Ok(Some(command))
}

fn parse_index(raw: &str) -> Result<u64, String> {
    raw.parse()
        .map_err(|_| format!("'{}' is not a block index", raw))
}

/// Run a command against the node and render its result.
pub async fn execute(node: &LedgerNode, command: Command) -> Result<String, NodeError> {
    let engine = node.engine();
    let out = match command {
        Command::Status => {
            let status = engine.status();
            format!(
                "node {} ({})\n  listening: {}\n  chain: {} blocks, tip {}\n  pending: {}\n  active authorities: {}\n  quorum: {}\n  peers: {}",
                status.node_id,
                status.node_name,
                node.sync()
                    .local_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                status.chain_length,
                status.tip_hash.as_deref().map(short).unwrap_or("-"),
                status.pending_blocks,
                status.active_authorities,
                status.min_validations_required,
                node.sync().peers().len()
            )
        }
        Command::Peers => {
            let peers = node.sync().peers();
            if peers.is_empty() {
                "no peers connected".to_string()
            } else {
                let mut out = String::new();
                for peer in peers {
                    let _ = writeln!(
                        out,
                        "{} {:?} node={} chain={} since {}",
                        peer.address,
                        peer.direction,
                        peer.node_id.as_deref().unwrap_or("?"),
                        peer.chain_length.map(|n| n.to_string()).unwrap_or_else(|| "?".into()),
                        peer.connected_at.to_rfc3339()
                    );
                }
                out.trim_end().to_string()
            }
        }
        Command::Chain => render_blocks(&engine.chain(), "chain is empty"),
        Command::Pending => render_blocks(&engine.pending_blocks(), "no pending blocks"),
        Command::Block(index) => match engine.get_block_details(index) {
            Some(view) => serde_json::to_string_pretty(&view).unwrap_or_else(|err| err.to_string()),
            None => format!("no block #{}", index),
        },
        Command::Authorities => {
            let stats = engine.get_authority_stats();
            let mut out = format!(
                "{} authorities ({} active, {} inactive)",
                stats.total_authorities, stats.active_authorities, stats.inactive_authorities
            );
            for authority in &stats.authorities {
                let _ = write!(out, "\n  {}", authority);
            }
            out
        }
        Command::Submit(payload) => {
            let index = engine.submit_block(payload, &node.config().authority_id)?;
            format!("block #{} is pending validation", index)
        }
        Command::Validate {
            index,
            validator_id,
        } => match engine.validate_block(index, &validator_id)? {
            ValidationOutcome::Recorded {
                count, required, ..
            } => format!("block #{} has {}/{} validations", index, count, required),
            ValidationOutcome::Finalized { indices } => {
                format!("finalized block(s) {:?}", indices)
            }
        },
        Command::Reject {
            index,
            authority_id,
        } => {
            let dropped = engine.reject_block(index, &authority_id)?;
            format!("abandoned {} pending block(s)", dropped.len())
        }
        Command::Grant {
            name,
            public_key,
            node_address,
            granter_id,
        } => {
            let grant = engine.grant_authority(&name, &public_key, &node_address, &granter_id)?;
            format!(
                "granted {} ({}), recorded in pending block #{}",
                name, grant.authority_id, grant.block_index
            )
        }
        Command::Revoke {
            authority_id,
            revoker_id,
        } => {
            let index = engine.revoke_authority(&authority_id, &revoker_id)?;
            format!("revoked {}, recorded in pending block #{}", authority_id, index)
        }
        Command::Connect(addr) => {
            node.sync().connect(&addr).await?;
            format!("connected to {}", addr)
        }
        Command::Disconnect(addr) => {
            if node.sync().disconnect(&addr) {
                format!("disconnected from {}", addr)
            } else {
                format!("not connected to {}", addr)
            }
        }
        Command::Help => HELP.to_string(),
        Command::Quit => "stopping".to_string(),
    };
    Ok(out)
}

fn render_blocks(blocks: &[Block], empty: &str) -> String {
    if blocks.is_empty() {
        return empty.to_string();
    }
    blocks
        .iter()
        .map(|b| {
            format!(
                "#{} {} type={} by {} validations={} prev={}",
                b.index(),
                short(b.hash()),
                b.payload_type().unwrap_or("-"),
                b.creator_id(),
                b.validation_count(),
                short(b.previous_hash())
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn short(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}

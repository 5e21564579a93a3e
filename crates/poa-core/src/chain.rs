// CHAIN VERIFICATION
// Structural checks shared by the consensus engine and peer sync
//
// SAFETY INVARIANTS:
// 1. chain[i].index == i for every position
// 2. chain[0].previous_hash is the genesis sentinel
// 3. chain[i].previous_hash == chain[i-1].hash for every i > 0
// 4. Every stored hash recomputes from the block contents
// 5. Only finalized blocks belong to a canonical chain

use log::debug;
use thiserror::Error;

use crate::block::Block;
use crate::GENESIS_PREVIOUS_HASH;

/// First structural break found in a candidate chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainFault {
    #[error("chain is empty")]
    Empty,

    #[error("block at position {position} carries index {found}")]
    IndexGap { position: u64, found: u64 },

    #[error("genesis block links to {found} instead of the sentinel")]
    BadGenesisLink { found: String },

    #[error("block #{index} hash does not match its contents")]
    HashMismatch { index: u64 },

    #[error("block #{index} links to {found}, expected {expected}")]
    BrokenLink {
        index: u64,
        expected: String,
        found: String,
    },

    #[error("block #{index} is not finalized")]
    NotFinalized { index: u64 },
}

/// Verify a full chain from genesis.
pub fn verify_chain(blocks: &[Block]) -> Result<(), ChainFault> {
    let first = blocks.first().ok_or(ChainFault::Empty)?;
    if first.previous_hash() != GENESIS_PREVIOUS_HASH {
        return Err(ChainFault::BadGenesisLink {
            found: first.previous_hash().to_string(),
        });
    }

    for (position, block) in blocks.iter().enumerate() {
        let position = position as u64;
        if block.index() != position {
            return Err(ChainFault::IndexGap {
                position,
                found: block.index(),
            });
        }
        check_sealed(block)?;
        if position > 0 {
            let prev = &blocks[(position - 1) as usize];
            check_link(prev, block)?;
        }
    }
    Ok(())
}

/// Verify that `next` extends `tip` at exactly the following index.
pub fn verify_extension(tip: &Block, next: &Block) -> Result<(), ChainFault> {
    let expected = tip.index() + 1;
    if next.index() != expected {
        return Err(ChainFault::IndexGap {
            position: expected,
            found: next.index(),
        });
    }
    check_sealed(next)?;
    check_link(tip, next)
}

/// Total validations across a chain, used as a fork-choice weight.
pub fn cumulative_validations(blocks: &[Block]) -> usize {
    blocks.iter().map(Block::validation_count).sum()
}

fn check_sealed(block: &Block) -> Result<(), ChainFault> {
    if !block.verify_hash() {
        debug!(
            "Block #{} stores hash {} but its contents hash to {}",
            block.index(),
            block.hash(),
            block.calculate_hash()
        );
        return Err(ChainFault::HashMismatch { index: block.index() });
    }
    if !block.is_finalized() {
        return Err(ChainFault::NotFinalized { index: block.index() });
    }
    Ok(())
}

fn check_link(prev: &Block, block: &Block) -> Result<(), ChainFault> {
    if block.previous_hash() != prev.hash() {
        debug!("Block #{} does not link to #{}", block.index(), prev.index());
        return Err(ChainFault::BrokenLink {
            index: block.index(),
            expected: prev.hash().to_string(),
            found: block.previous_hash().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Payload;
    use chrono::Utc;
    use serde_json::json;

    fn sealed(index: u64, previous_hash: &str) -> Block {
        let mut payload = Payload::new();
        payload.insert("seq".into(), json!(index));
        let mut block = Block::new(index, payload, previous_hash.into(), "GENESIS_AUTH".into(), "Genesis Authority".into());
        block.add_validation("GENESIS_AUTH", "Genesis Authority", Utc::now()).unwrap();
        block.finalize(1, Utc::now());
        block
    }

    fn build(len: u64) -> Vec<Block> {
        let mut chain = vec![sealed(0, GENESIS_PREVIOUS_HASH)];
        for i in 1..len {
            let prev = chain[(i - 1) as usize].hash().to_string();
            chain.push(sealed(i, &prev));
        }
        chain
    }

    #[test]
    fn well_formed_chain_verifies() {
        assert_eq!(verify_chain(&build(5)), Ok(()));
        assert_eq!(cumulative_validations(&build(5)), 5);
    }

    #[test]
    fn empty_chain_is_rejected() {
        assert_eq!(verify_chain(&[]), Err(ChainFault::Empty));
    }

    #[test]
    fn broken_link_is_reported_at_its_index() {
        let mut chain = build(5);
        chain[3] = sealed(3, "not-the-parent");
        assert!(matches!(
            verify_chain(&chain),
            Err(ChainFault::BrokenLink { index: 3, .. })
        ));
    }

    #[test]
    fn unfinalized_block_is_rejected() {
        let mut chain = build(2);
        let prev = chain[1].hash().to_string();
        chain.push(Block::new(2, Payload::new(), prev, "X".into(), "X".into()));
        assert_eq!(verify_chain(&chain), Err(ChainFault::NotFinalized { index: 2 }));
    }

    #[test]
    fn extension_checks_index_and_link() {
        let chain = build(3);
        let next = sealed(3, chain[2].hash());
        assert_eq!(verify_extension(&chain[2], &next), Ok(()));
        assert!(matches!(
            verify_extension(&chain[1], &next),
            Err(ChainFault::IndexGap { position: 2, found: 3 })
        ));
    }
}

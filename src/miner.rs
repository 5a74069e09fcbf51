//! Proof-of-work block assembly.
//!
//! Grounded on the nonce-search loop shape in the pack's PoW miners (e.g.
//! `other_examples`' Knotcoin `mine_block`): build a header template once,
//! then iterate the nonce until the resulting hash clears the difficulty
//! target, checking a cancellation signal periodically rather than on every
//! iteration so the hot loop isn't dominated by atomic loads.

use std::collections::HashSet;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::hashing::CanonicalizationError;
use crate::types::{AssetId, Block, Entry, Header};

/// Nonce attempts between cancellation checks.
const CANCELLATION_CHECK_INTERVAL: u64 = 1 << 12;

#[derive(Debug, Error)]
pub enum MiningError {
    #[error("mining was cancelled before a valid nonce was found")]
    Cancelled,
    #[error("block would seal two transfers of the same asset: {0}")]
    DuplicateAssetTransfer(AssetId),
    #[error("failed to canonicalize block header: {0}")]
    Canonicalization(#[from] CanonicalizationError),
}

/// Defense-in-depth check: the asset registry's `begin_transfer` reservation
/// should already prevent two in-flight transfers of the same asset from
/// both reaching the pending pool, but `mine_next_block` re-checks the exact
/// batch it's about to seal rather than trusting that invariant blindly.
fn reject_duplicate_asset_transfers(entries: &[Entry]) -> Result<(), MiningError> {
    let mut seen = HashSet::new();
    for entry in entries {
        if entry.asset_to().is_some() {
            if let Some(asset_id) = entry.asset_id() {
                if !seen.insert(asset_id.to_string()) {
                    return Err(MiningError::DuplicateAssetTransfer(asset_id.to_string()));
                }
            }
        }
    }
    Ok(())
}

/// Searches for a nonce producing a block hash with `difficulty` leading
/// hex-zero digits, sealing `entries` on top of `parent`.
///
/// This is a blocking, CPU-bound call; callers on an async executor should
/// run it via `spawn_blocking` rather than awaiting it directly.
pub fn mine_next_block(
    parent: &Block,
    entries: Vec<Entry>,
    difficulty: u32,
    cancel: &CancellationToken,
) -> Result<Block, MiningError> {
    reject_duplicate_asset_transfers(&entries)?;

    let parent_hash = parent.hash()?;
    let entries_root = Block::entries_root(&entries)?;

    let mut header = Header {
        index: parent.header.index + 1,
        parent_hash,
        timestamp: Utc::now(),
        entries_root,
        difficulty,
        nonce: 0,
    };

    let mut nonce: u64 = 0;
    loop {
        header.nonce = nonce;
        let hash = header.compute_hash()?;
        if hash.has_leading_zero_hex_digits(difficulty) {
            return Ok(Block { header, entries });
        }

        nonce = nonce.wrapping_add(1);
        if nonce % CANCELLATION_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(MiningError::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Metadata, MetadataValue};

    #[test]
    fn mines_a_block_satisfying_zero_difficulty_immediately() {
        let genesis = Block::genesis(Utc::now(), "Genesis entry").unwrap();
        let cancel = CancellationToken::new();
        let block = mine_next_block(&genesis, Vec::new(), 0, &cancel).unwrap();
        assert_eq!(block.header.index, 1);
        assert!(block.extends(&genesis).unwrap());
    }

    #[test]
    fn mined_block_hash_clears_the_requested_difficulty() {
        let genesis = Block::genesis(Utc::now(), "Genesis entry").unwrap();
        let cancel = CancellationToken::new();
        let entries = vec![Entry::new(
            "hello".to_string(),
            "alice".to_string(),
            "note".to_string(),
            Utc::now(),
            Metadata::new(),
        )];
        let block = mine_next_block(&genesis, entries, 4, &cancel).unwrap();
        let hash = block.hash().unwrap();
        assert!(hash.has_leading_zero_hex_digits(4));
    }

    #[test]
    fn cancellation_is_observed() {
        let genesis = Block::genesis(Utc::now(), "Genesis entry").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        // A difficulty high enough that zero-difficulty's instant hit can't
        // mask a missed cancellation check; nonce 0 is checked before the
        // first cancellation test, so this may still succeed at difficulty
        // 0 -- use a difficulty that is very unlikely to be hit by nonce 0.
        let result = mine_next_block(&genesis, Vec::new(), 64, &cancel);
        assert!(matches!(result, Err(MiningError::Cancelled)));
    }

    fn transfer_entry(author: &str, asset_id: &str, to: &str) -> Entry {
        let mut metadata = Metadata::new();
        metadata.insert("asset.id".to_string(), MetadataValue::String(asset_id.to_string()));
        metadata.insert("asset.to".to_string(), MetadataValue::String(to.to_string()));
        Entry::new("transfer".to_string(), author.to_string(), "note".to_string(), Utc::now(), metadata)
    }

    #[test]
    fn two_transfers_of_the_same_asset_in_one_batch_are_rejected() {
        let genesis = Block::genesis(Utc::now(), "Genesis entry").unwrap();
        let cancel = CancellationToken::new();
        let entries = vec![transfer_entry("alice", "vase-1", "bob"), transfer_entry("alice", "vase-1", "carol")];
        let result = mine_next_block(&genesis, entries, 0, &cancel);
        assert!(matches!(result, Err(MiningError::DuplicateAssetTransfer(_))));
    }
}

//! Sealed blocks: the immutable, hash-chained unit of the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hashing::{self, CanonicalizationError, Hash256};

use super::{Entry, Metadata, ValidationStatus};

/// The hash of a [`Block`]'s [`Header`], computed over its canonical bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHash(pub Hash256);

impl BlockHash {
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    pub fn has_leading_zero_hex_digits(&self, difficulty: u32) -> bool {
        self.0.has_leading_zero_hex_digits(difficulty)
    }
}

impl std::fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockHash({})", self.0.to_hex())
    }
}

impl std::fmt::Display for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

/// The hash of the (nonexistent) block before genesis. Genesis is the only
/// block whose `parent_hash` equals this constant.
pub fn parent_of_genesis() -> BlockHash {
    BlockHash(Hash256([0u8; hashing::HASH_LEN]))
}

/// A block header. Hashing and proof-of-work are computed over this struct's
/// canonical bytes; `entries_root` binds the header to the entries it seals
/// without hashing the (potentially large) entry bodies directly into the
/// value the miner repeatedly rehashes while searching for a nonce.
#[derive(Clone, Serialize, Deserialize)]
pub struct Header {
    pub index: u64,
    pub parent_hash: BlockHash,
    pub timestamp: DateTime<Utc>,
    pub entries_root: Hash256,
    pub difficulty: u32,
    pub nonce: u64,
}

impl Header {
    /// Computes this header's hash (the block hash).
    pub fn compute_hash(&self) -> Result<BlockHash, CanonicalizationError> {
        hashing::fingerprint_of(self).map(BlockHash)
    }
}

/// A sealed block: an ordered batch of validated entries plus the header
/// that chains it to its predecessor.
#[derive(Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub entries: Vec<Entry>,
}

impl Block {
    /// Builds the genesis block: index 0, parent hash of all zero bytes,
    /// nonce 0 (genesis is not mined — it trivially satisfies any difficulty
    /// since it is the fixed root of trust), carrying one constitutional
    /// entry built from `genesis_text`. That entry's `validation_status` is
    /// set to `Valid` axiomatically; it never runs through the admission
    /// pipeline since there is no prior block to admit it against.
    pub fn genesis(timestamp: DateTime<Utc>, genesis_text: &str) -> Result<Self, CanonicalizationError> {
        let mut genesis_entry = Entry::new(
            genesis_text.to_string(),
            "genesis".to_string(),
            "genesis".to_string(),
            timestamp,
            Metadata::new(),
        );
        genesis_entry.validation_status = ValidationStatus::Valid;
        let entries = vec![genesis_entry];
        let entries_root = Self::entries_root(&entries)?;
        Ok(Block {
            header: Header {
                index: 0,
                parent_hash: parent_of_genesis(),
                timestamp,
                entries_root,
                difficulty: 0,
                nonce: 0,
            },
            entries,
        })
    }

    /// Computes the root binding this block's entries to its header.
    pub fn entries_root(entries: &[Entry]) -> Result<Hash256, CanonicalizationError> {
        hashing::fingerprint_of(&entries.iter().map(Entry::signable_form).collect::<Vec<_>>())
    }

    /// This block's hash.
    pub fn hash(&self) -> Result<BlockHash, CanonicalizationError> {
        self.header.compute_hash()
    }

    /// `true` if `self` correctly extends `parent`: index succeeds parent's,
    /// and `parent_hash` matches parent's actual hash.
    pub fn extends(&self, parent: &Block) -> Result<bool, CanonicalizationError> {
        let parent_hash = parent.hash()?;
        Ok(self.header.index == parent.header.index + 1 && self.header.parent_hash == parent_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;

    #[test]
    fn genesis_has_zero_parent_hash_and_one_constitutional_entry() {
        let g = Block::genesis(Utc::now(), "Genesis entry").unwrap();
        assert_eq!(g.header.index, 0);
        assert_eq!(g.header.parent_hash, parent_of_genesis());
        assert_eq!(g.entries.len(), 1);
        assert_eq!(g.entries[0].content, "Genesis entry");
        assert_eq!(g.entries[0].validation_status, ValidationStatus::Valid);
    }

    #[test]
    fn hash_changes_when_nonce_changes() {
        let g = Block::genesis(Utc::now(), "Genesis entry").unwrap();
        let h1 = g.hash().unwrap();
        let mut g2 = g.clone();
        g2.header.nonce = 1;
        let h2 = g2.hash().unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn child_extends_parent_only_with_matching_hash_and_index() {
        let genesis = Block::genesis(Utc::now(), "Genesis entry").unwrap();
        let entries = vec![Entry::new(
            "hello".to_string(),
            "alice".to_string(),
            "note".to_string(),
            Utc::now(),
            Metadata::new(),
        )];
        let root = Block::entries_root(&entries).unwrap();
        let child = Block {
            header: Header {
                index: 1,
                parent_hash: genesis.hash().unwrap(),
                timestamp: Utc::now(),
                entries_root: root,
                difficulty: 0,
                nonce: 0,
            },
            entries,
        };
        assert!(child.extends(&genesis).unwrap());

        let mut bad_index = child.clone();
        bad_index.header.index = 5;
        assert!(!bad_index.extends(&genesis).unwrap());
    }
}

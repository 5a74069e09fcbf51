//! Core domain types: entries, blocks, and the small value types shared
//! across the admission pipeline and chain state.
//!
//! This mirrors `rishy2211-mlsnitch`'s `types` module layout (strongly-typed
//! wrappers instead of naked byte buffers / strings) but the payload is a
//! prose ledger entry rather than an ML model registration.

pub mod block;
pub mod entry;

pub use block::{Block, BlockHash, Header};
pub use entry::{
    Entry, EntryPublicKey, EntrySignature, Metadata, MetadataValue, ParentRef, RelationshipKind, ValidationStatus,
    PROTECTED_METADATA_KEYS,
};

/// Opaque author identifier. Bounded to `max_author_bytes`; bound-checking
/// happens in the admission pipeline's schema gate, not here.
pub type Author = String;

/// Identifier for an asset under management by the [`crate::registry::AssetRegistry`].
///
/// Declared by submitters under the reserved `asset.*` metadata namespace.
pub type AssetId = String;

/// A `(block_index, entry_index)` location of a sealed entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct EntryLocation {
    pub block_index: u64,
    pub entry_index: u32,
}

impl EntryLocation {
    pub fn new(block_index: u64, entry_index: u32) -> Self {
        Self {
            block_index,
            entry_index,
        }
    }
}

impl std::fmt::Display for EntryLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.block_index, self.entry_index)
    }
}

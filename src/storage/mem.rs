//! In-memory storage backend.
//!
//! Grounded on rishy2211-mlsnitch's `InMemoryBlockStore` (`storage/mem.rs`), but
//! swaps the `HashMap<height, Block>` there for an [`arc_swap::ArcSwapOption`]
//! holding the whole [`Snapshot`], since atomicity here means "readers never
//! see a half-updated snapshot" rather than "one block insert at a time".

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use super::{check_snapshot_version, Snapshot, Storage, StorageError, StorageHealth};

/// A `Storage` backend that keeps the snapshot entirely in process memory.
/// Nothing survives a restart; useful for tests and the demo binary.
pub struct InMemoryStorage {
    slot: ArcSwapOption<Snapshot>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            slot: ArcSwapOption::from(None),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for InMemoryStorage {
    fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        let Some(snapshot) = self.slot.load_full().map(|arc| (*arc).clone()) else {
            return Ok(None);
        };
        check_snapshot_version(&snapshot)?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        self.slot.store(Some(Arc::new(snapshot.clone())));
        Ok(())
    }

    fn health(&self) -> StorageHealth {
        StorageHealth {
            available: true,
            read_only: false,
            backend_name: "memory".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_before_any_save_is_none() {
        let store = InMemoryStorage::new();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let store = InMemoryStorage::new();
        let snap = Snapshot::default();
        store.save(&snap).unwrap();
        assert!(store.load().unwrap().is_some());
    }

    #[test]
    fn later_save_replaces_earlier_one_atomically() {
        let store = InMemoryStorage::new();
        store.save(&Snapshot::default()).unwrap();
        let mut second = Snapshot::default();
        second.pending = vec![];
        store.save(&second).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.blocks.len(), second.blocks.len());
    }
}

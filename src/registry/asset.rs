//! Asset ownership tracking with first-admitted-wins conflict resolution.
//!
//! An asset is implicitly registered to whichever author's entry first
//! declares its `asset.id` without a transfer destination. From then on,
//! only the current owner may initiate a transfer (`asset.to` set), and
//! only one transfer per asset may be in flight in the pending pool at a
//! time — the second conflicting submission loses, first-admitted-wins,
//! exactly like rishy2211-mlsnitch's duplicate-`Aid` check in `BaseValidity`
//! except stateful across the whole chain rather than scoped to one block.

use std::collections::HashMap;

use thiserror::Error;

use crate::types::{AssetId, Author, Block, Entry};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("asset {asset_id} is owned by {actual}, not {expected}")]
    NotOwner {
        asset_id: AssetId,
        expected: Author,
        actual: Author,
    },
    #[error("asset {asset_id} already has a transfer in flight")]
    TransferInFlight { asset_id: AssetId },
    #[error("asset {asset_id} is unknown")]
    Unknown { asset_id: AssetId },
    #[error("asset {asset_id} has no transfer in flight to abort or commit")]
    NoTransferInFlight { asset_id: AssetId },
    #[error("asset {asset_id} cannot be transferred to its current owner")]
    DestinationEqualsOwner { asset_id: AssetId },
}

/// Tracks current ownership and in-flight transfers for assets declared
/// under the reserved `asset.*` metadata namespace.
#[derive(Default, Clone)]
pub struct AssetRegistry {
    owners: HashMap<AssetId, Author>,
    in_flight: HashMap<AssetId, Author>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry by replaying every sealed entry's asset
    /// declarations in chain order. The pending pool is never part of this
    /// replay — registry state is a pure function of what's already sealed.
    pub fn rebuild_from_blocks(blocks: &[Block]) -> Self {
        let mut registry = Self::new();
        for block in blocks {
            for entry in &block.entries {
                registry.apply_sealed_entry(entry);
            }
        }
        registry
    }

    fn apply_sealed_entry(&mut self, entry: &Entry) {
        let Some(asset_id) = entry.asset_id() else {
            return;
        };
        match entry.asset_to() {
            None => {
                self.owners
                    .entry(asset_id.to_string())
                    .or_insert_with(|| entry.author.clone());
            }
            Some(to) => {
                if self.owners.get(asset_id) == Some(&entry.author) {
                    self.owners.insert(asset_id.to_string(), to.to_string());
                }
                self.in_flight.remove(asset_id);
            }
        }
    }

    pub fn owner_of(&self, asset_id: &str) -> Option<&Author> {
        self.owners.get(asset_id)
    }

    /// Registers a brand-new asset to `author`, if it isn't already owned.
    /// Does nothing (first-admitted-wins) if the asset already has an owner.
    pub fn register_if_new(&mut self, asset_id: &str, author: &Author) {
        self.owners
            .entry(asset_id.to_string())
            .or_insert_with(|| author.clone());
    }

    /// Reserves an asset for transfer from `from` to `to`. Fails if `from`
    /// is not the current owner, or if another transfer for this asset is
    /// already reserved.
    pub fn begin_transfer(&mut self, asset_id: &str, from: &Author, to: &Author) -> Result<(), RegistryError> {
        let owner = self
            .owners
            .get(asset_id)
            .ok_or_else(|| RegistryError::Unknown {
                asset_id: asset_id.to_string(),
            })?;
        if owner != from {
            return Err(RegistryError::NotOwner {
                asset_id: asset_id.to_string(),
                expected: from.clone(),
                actual: owner.clone(),
            });
        }
        if to == owner {
            return Err(RegistryError::DestinationEqualsOwner {
                asset_id: asset_id.to_string(),
            });
        }
        if self.in_flight.contains_key(asset_id) {
            return Err(RegistryError::TransferInFlight {
                asset_id: asset_id.to_string(),
            });
        }
        self.in_flight.insert(asset_id.to_string(), to.clone());
        Ok(())
    }

    /// Finalizes a reserved transfer, moving ownership to its recipient.
    /// Called when the entry that reserved it is sealed into a block.
    pub fn commit_transfer(&mut self, asset_id: &str) -> Result<(), RegistryError> {
        let to = self
            .in_flight
            .remove(asset_id)
            .ok_or_else(|| RegistryError::NoTransferInFlight {
                asset_id: asset_id.to_string(),
            })?;
        self.owners.insert(asset_id.to_string(), to);
        Ok(())
    }

    /// Releases a reservation without transferring ownership. Called when
    /// the entry that reserved it is rejected or discarded before mining.
    pub fn abort_transfer(&mut self, asset_id: &str) {
        self.in_flight.remove(asset_id);
    }

    /// Current ownership table, for persisting into a snapshot.
    pub fn owners_snapshot(&self) -> HashMap<AssetId, Author> {
        self.owners.clone()
    }

    /// Currently in-flight transfer reservations, for persisting into a
    /// snapshot.
    pub fn pending_transfers_snapshot(&self) -> HashMap<AssetId, Author> {
        self.in_flight.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_declaration_without_transfer_registers_owner() {
        let mut r = AssetRegistry::new();
        r.register_if_new("vase-1", &"alice".to_string());
        assert_eq!(r.owner_of("vase-1"), Some(&"alice".to_string()));
    }

    #[test]
    fn second_registration_does_not_override_first() {
        let mut r = AssetRegistry::new();
        r.register_if_new("vase-1", &"alice".to_string());
        r.register_if_new("vase-1", &"bob".to_string());
        assert_eq!(r.owner_of("vase-1"), Some(&"alice".to_string()));
    }

    #[test]
    fn non_owner_cannot_begin_transfer() {
        let mut r = AssetRegistry::new();
        r.register_if_new("vase-1", &"alice".to_string());
        let err = r
            .begin_transfer("vase-1", &"bob".to_string(), &"carol".to_string())
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotOwner { .. }));
    }

    #[test]
    fn second_concurrent_transfer_conflicts_first_admitted_wins() {
        let mut r = AssetRegistry::new();
        r.register_if_new("vase-1", &"alice".to_string());
        r.begin_transfer("vase-1", &"alice".to_string(), &"bob".to_string())
            .unwrap();
        let err = r
            .begin_transfer("vase-1", &"alice".to_string(), &"carol".to_string())
            .unwrap_err();
        assert!(matches!(err, RegistryError::TransferInFlight { .. }));
    }

    #[test]
    fn commit_transfer_moves_ownership_and_clears_reservation() {
        let mut r = AssetRegistry::new();
        r.register_if_new("vase-1", &"alice".to_string());
        r.begin_transfer("vase-1", &"alice".to_string(), &"bob".to_string())
            .unwrap();
        r.commit_transfer("vase-1").unwrap();
        assert_eq!(r.owner_of("vase-1"), Some(&"bob".to_string()));
        // new transfer now possible since the reservation was cleared
        r.begin_transfer("vase-1", &"bob".to_string(), &"carol".to_string())
            .unwrap();
    }

    #[test]
    fn transfer_to_the_current_owner_is_rejected() {
        let mut r = AssetRegistry::new();
        r.register_if_new("vase-1", &"alice".to_string());
        let err = r
            .begin_transfer("vase-1", &"alice".to_string(), &"alice".to_string())
            .unwrap_err();
        assert!(matches!(err, RegistryError::DestinationEqualsOwner { .. }));
    }

    #[test]
    fn abort_transfer_allows_a_retry() {
        let mut r = AssetRegistry::new();
        r.register_if_new("vase-1", &"alice".to_string());
        r.begin_transfer("vase-1", &"alice".to_string(), &"bob".to_string())
            .unwrap();
        r.abort_transfer("vase-1");
        r.begin_transfer("vase-1", &"alice".to_string(), &"carol".to_string())
            .unwrap();
    }
}

//! Derivative-work DAG over sealed entries.
//!
//! Parent refs may only point at already-sealed `(block_index, entry_index)`
//! locations, never at another entry still sitting in the pending pool.
//! That single rule is what keeps this a DAG rather than a general graph:
//! since every edge points strictly backward into already-committed chain
//! history, a cycle is unconstructible — there is no need for a runtime
//! cycle check, only a "does this location exist yet" check.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::types::{Entry, EntryLocation, RelationshipKind};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("parent ref {0} points at an entry that has not been sealed")]
    UnknownParent(EntryLocation),
}

/// Tracks which sealed entries exist and the derivative edges between them.
#[derive(Default, Clone)]
pub struct DerivativeRegistry {
    known: HashSet<EntryLocation>,
    edges: HashMap<EntryLocation, Vec<(EntryLocation, RelationshipKind)>>,
}

impl DerivativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild_from_blocks(blocks: &[crate::types::Block]) -> Self {
        let mut registry = Self::new();
        for (block_index, block) in blocks.iter().enumerate() {
            for (entry_index, entry) in block.entries.iter().enumerate() {
                let location = EntryLocation::new(block_index as u64, entry_index as u32);
                registry.record_sealed_entry(location, entry);
            }
        }
        registry
    }

    /// Validates that every parent ref on a not-yet-sealed entry points at
    /// a location this registry already knows about.
    pub fn validate_parent_refs(&self, entry: &Entry) -> Result<(), RegistryError> {
        for parent in &entry.parent_refs {
            if !self.known.contains(&parent.location) {
                return Err(RegistryError::UnknownParent(parent.location));
            }
        }
        Ok(())
    }

    /// Records a freshly sealed entry's location and the edges it declares
    /// to its parents. Call only after [`Self::validate_parent_refs`] has
    /// already accepted the entry and it has actually been sealed.
    pub fn record_sealed_entry(&mut self, location: EntryLocation, entry: &Entry) {
        for parent in &entry.parent_refs {
            self.edges
                .entry(parent.location)
                .or_default()
                .push((location, parent.relationship));
        }
        self.known.insert(location);
    }

    /// Direct children of `location`, with the relationship each declares.
    pub fn children_of(&self, location: EntryLocation) -> &[(EntryLocation, RelationshipKind)] {
        self.edges.get(&location).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every descendant of `location` reachable by following child edges
    /// transitively, breadth-first. Since edges only ever point forward from
    /// an already-sealed parent to a later child, this traversal always
    /// terminates without a visited-set cycle guard being load-bearing --
    /// it's kept anyway since a location can be reached by more than one
    /// path and must only be returned once.
    pub fn descendants_of(&self, location: EntryLocation) -> Vec<EntryLocation> {
        let mut visited = HashSet::new();
        let mut queue: std::collections::VecDeque<EntryLocation> = self.children_of(location).iter().map(|(loc, _)| *loc).collect();
        let mut descendants = Vec::new();

        while let Some(next) = queue.pop_front() {
            if !visited.insert(next) {
                continue;
            }
            descendants.push(next);
            for (child, _) in self.children_of(next) {
                if !visited.contains(child) {
                    queue.push_back(*child);
                }
            }
        }

        descendants
    }

    pub fn contains(&self, location: EntryLocation) -> bool {
        self.known.contains(&location)
    }

    /// Every derivative edge this registry knows about, for persisting into
    /// a snapshot.
    pub fn edges_snapshot(&self) -> Vec<(EntryLocation, EntryLocation, RelationshipKind)> {
        self.edges
            .iter()
            .flat_map(|(parent, children)| children.iter().map(move |(child, rel)| (*child, *parent, *rel)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Metadata, ParentRef};
    use chrono::Utc;

    fn entry_with_parent(location: EntryLocation, relationship: RelationshipKind) -> Entry {
        let mut e = Entry::new(
            "a revision".to_string(),
            "bob".to_string(),
            "amend".to_string(),
            Utc::now(),
            Metadata::new(),
        );
        e.parent_refs.push(ParentRef {
            location,
            relationship,
        });
        e
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let registry = DerivativeRegistry::new();
        let entry = entry_with_parent(EntryLocation::new(0, 0), RelationshipKind::Amendment);
        assert!(matches!(
            registry.validate_parent_refs(&entry),
            Err(RegistryError::UnknownParent(_))
        ));
    }

    #[test]
    fn known_parent_is_accepted_and_edge_recorded() {
        let mut registry = DerivativeRegistry::new();
        let parent_loc = EntryLocation::new(0, 0);
        let parent_entry = Entry::new(
            "original".to_string(),
            "alice".to_string(),
            "offer".to_string(),
            Utc::now(),
            Metadata::new(),
        );
        registry.record_sealed_entry(parent_loc, &parent_entry);

        let child = entry_with_parent(parent_loc, RelationshipKind::Amendment);
        assert!(registry.validate_parent_refs(&child).is_ok());

        let child_loc = EntryLocation::new(1, 0);
        registry.record_sealed_entry(child_loc, &child);
        let children = registry.children_of(parent_loc);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].0, child_loc);
    }

    #[test]
    fn descendants_of_follows_multiple_hops() {
        let mut registry = DerivativeRegistry::new();
        let root = EntryLocation::new(0, 0);
        registry.record_sealed_entry(
            root,
            &Entry::new("root".to_string(), "alice".to_string(), "offer".to_string(), Utc::now(), Metadata::new()),
        );

        let child = entry_with_parent(root, RelationshipKind::Amendment);
        let child_loc = EntryLocation::new(1, 0);
        registry.record_sealed_entry(child_loc, &child);

        let grandchild = entry_with_parent(child_loc, RelationshipKind::Extension);
        let grandchild_loc = EntryLocation::new(2, 0);
        registry.record_sealed_entry(grandchild_loc, &grandchild);

        let descendants = registry.descendants_of(root);
        assert_eq!(descendants.len(), 2);
        assert!(descendants.contains(&child_loc));
        assert!(descendants.contains(&grandchild_loc));
    }

    #[test]
    fn descendants_of_a_leaf_is_empty() {
        let mut registry = DerivativeRegistry::new();
        let leaf = EntryLocation::new(0, 0);
        registry.record_sealed_entry(
            leaf,
            &Entry::new("leaf".to_string(), "alice".to_string(), "offer".to_string(), Utc::now(), Metadata::new()),
        );
        assert!(registry.descendants_of(leaf).is_empty());
    }
}

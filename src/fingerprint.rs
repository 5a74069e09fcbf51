//! Short-window duplicate-submission cache.
//!
//! Grounded on rishy2211-mlsnitch's dup-`Aid` check in `BaseValidity`
//! (`validation/base.rs`), generalized from "no two txs in *this block*
//! may register the same Aid" to "no two submissions within the cache's TTL
//! may carry the same `(content, author, intent)` fingerprint", with an
//! explicit TTL sweep since this cache spans many blocks, not one.
//!
//! Timestamps are wall-clock (`chrono::DateTime<Utc>`), not
//! `std::time::Instant`, so the whole cache can be serialized into a
//! storage snapshot and rebuilt as-is after a restart.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::hashing::Hash256;

/// Default time a fingerprint is remembered before it can be resubmitted.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Tracks recently admitted entry fingerprints to reject duplicate prose
/// within a sliding time-to-live window.
#[derive(Clone)]
pub struct EntryFingerprintCache {
    ttl: Duration,
    seen: HashMap<Hash256, DateTime<Utc>>,
}

impl EntryFingerprintCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: HashMap::new(),
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(DEFAULT_TTL)
    }

    /// Rebuilds a cache from persisted `(fingerprint, seen_at)` pairs,
    /// sweeping anything already past its TTL as of `now`.
    pub fn from_entries(ttl: Duration, entries: Vec<(Hash256, DateTime<Utc>)>, now: DateTime<Utc>) -> Self {
        let mut cache = Self::new(ttl);
        cache.seen = entries.into_iter().collect();
        cache.sweep(now);
        cache
    }

    /// Everything currently remembered, for persisting into a snapshot.
    pub fn entries(&self) -> Vec<(Hash256, DateTime<Utc>)> {
        self.seen.iter().map(|(fp, at)| (*fp, *at)).collect()
    }

    fn is_expired(&self, inserted_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - inserted_at).to_std() {
            Ok(elapsed) => elapsed >= self.ttl,
            // `now` precedes `inserted_at` (clock skew): not expired yet.
            Err(_) => false,
        }
    }

    /// Removes entries whose TTL has elapsed as of `now`.
    pub fn sweep(&mut self, now: DateTime<Utc>) {
        self.seen.retain(|_, inserted_at| !self.is_expired(*inserted_at, now));
    }

    /// `true` if `fingerprint` was already seen within the TTL window as of
    /// `now`. Does not record `fingerprint`; call [`Self::record`] after the
    /// admission decision succeeds.
    pub fn contains(&mut self, fingerprint: &Hash256, now: DateTime<Utc>) -> bool {
        self.sweep(now);
        self.seen.contains_key(fingerprint)
    }

    /// Records `fingerprint` as seen at `now`.
    pub fn record(&mut self, fingerprint: Hash256, now: DateTime<Utc>) {
        self.seen.insert(fingerprint, now);
    }
}

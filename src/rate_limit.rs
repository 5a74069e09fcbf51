//! Per-author sliding-window rate limiting.
//!
//! Same "reject before the expensive check runs" placement as rishy2211-mlsnitch's
//! `BaseValidity` size/count checks in the consensus pipeline, but keyed per
//! author and evaluated against a rolling time window rather than a single
//! block.
//!
//! Timestamps are wall-clock (`chrono::DateTime<Utc>`), not
//! `std::time::Instant`, so submission history can be serialized into a
//! storage snapshot and rebuilt as-is after a restart.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::Author;

/// Default submissions allowed per author per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 20;
/// Default window width.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Tracks recent submission timestamps per author and rejects submissions
/// once an author exceeds `max_requests` within `window`.
#[derive(Clone)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    history: HashMap<Author, Vec<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            history: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }

    /// Rebuilds a limiter from persisted per-author submission timestamps,
    /// pruning anything already outside the window as of `now`.
    pub fn from_history(max_requests: u32, window: Duration, history: Vec<(Author, Vec<DateTime<Utc>>)>, now: DateTime<Utc>) -> Self {
        let mut limiter = Self::new(max_requests, window);
        limiter.history = history.into_iter().collect();
        for stamps in limiter.history.values_mut() {
            stamps.retain(|t| !is_outside_window(*t, now, window));
        }
        limiter
    }

    /// Everything currently remembered, for persisting into a snapshot.
    pub fn history(&self) -> Vec<(Author, Vec<DateTime<Utc>>)> {
        self.history.iter().map(|(author, stamps)| (author.clone(), stamps.clone())).collect()
    }

    /// Checks whether `author` may submit another entry at `now`, without
    /// recording the attempt. Call [`Self::record`] only after the
    /// submission is otherwise accepted.
    pub fn check(&mut self, author: &Author, now: DateTime<Utc>) -> bool {
        let window = self.window;
        let count = self
            .history
            .get(author)
            .map(|stamps| stamps.iter().filter(|t| !is_outside_window(**t, now, window)).count())
            .unwrap_or(0);
        (count as u32) < self.max_requests
    }

    /// Records a submission attempt by `author` at `now`, pruning entries
    /// older than the window.
    pub fn record(&mut self, author: &Author, now: DateTime<Utc>) {
        let window = self.window;
        let stamps = self.history.entry(author.clone()).or_default();
        stamps.retain(|t| !is_outside_window(*t, now, window));
        stamps.push(now);
    }
}

fn is_outside_window(stamp: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    match (now - stamp).to_std() {
        Ok(elapsed) => elapsed >= window,
        // `now` precedes `stamp` (clock skew): treat as still inside the window.
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_limit_is_allowed() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(60));
        let author = "alice".to_string();
        let now = Utc::now();
        assert!(limiter.check(&author, now));
        limiter.record(&author, now);
        assert!(limiter.check(&author, now));
    }

    #[test]
    fn hitting_the_limit_blocks_further_submissions() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(60));
        let author = "alice".to_string();
        let now = Utc::now();
        limiter.record(&author, now);
        limiter.record(&author, now);
        assert!(!limiter.check(&author, now));
    }

    #[test]
    fn window_elapsing_frees_up_capacity() {
        let mut limiter = RateLimiter::new(1, Duration::from_millis(10));
        let author = "alice".to_string();
        let t0 = Utc::now();
        limiter.record(&author, t0);
        assert!(!limiter.check(&author, t0));

        let later = t0 + chrono::Duration::milliseconds(50);
        assert!(limiter.check(&author, later));
    }

    #[test]
    fn round_trips_through_history_and_from_history() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(60));
        let author = "alice".to_string();
        let now = Utc::now();
        limiter.record(&author, now);
        assert!(!limiter.check(&author, now));

        let mut restored = RateLimiter::from_history(1, Duration::from_secs(60), limiter.history(), now);
        assert!(!restored.check(&author, now));
    }
}

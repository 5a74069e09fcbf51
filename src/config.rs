//! Top-level configuration for a ledger node.
//!
//! Aggregates configuration for admission (schema limits, signature
//! requirement, LLM retry policy), the dedup cache, the rate limiter, and
//! mining, the same way `rishy2211-mlsnitch`'s `ChainConfig` aggregates
//! consensus/storage/ml-client/metrics sub-configs into one struct a binary
//! can construct from defaults and hand to the node. There is no metrics
//! sub-config here: this system carries structured logging via `tracing`
//! as its observability layer rather than a Prometheus exporter.

use std::time::Duration;

use crate::admission::AdmissionConfig;
use crate::fingerprint::DEFAULT_TTL as DEFAULT_FINGERPRINT_TTL;
use crate::rate_limit::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};
use crate::validation::RetryPolicy;

/// Default proof-of-work difficulty: number of leading hex-zero digits a
/// mined block's hash must have.
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// Default constitutional text sealed into the genesis block.
pub const DEFAULT_GENESIS_TEXT: &str = "Genesis entry";

/// Default cap on how many entries may sit in the pending pool at once.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Default cap on how many entries a single mined block may seal.
pub const DEFAULT_MAX_BLOCK_ENTRIES: usize = 256;

/// Top-level configuration for a ledger node.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Schema limits and signature requirement for the admission pipeline.
    pub admission: AdmissionConfig,
    /// Retry policy for the semantic validator's LLM calls.
    pub retry_policy: RetryPolicy,
    /// How long a submitted fingerprint blocks a resubmission.
    pub fingerprint_cache_ttl: Duration,
    /// Per-author submissions allowed per [`Self::rate_limit_window`].
    pub rate_limit_max_requests: u32,
    pub rate_limit_window: Duration,
    /// Leading hex-zero digits a mined block's hash must satisfy.
    pub difficulty: u32,
    /// Whether `mine` may seal a block with no pending entries.
    pub allow_empty_blocks: bool,
    /// Constitutional text sealed into the one entry the genesis block
    /// carries.
    pub genesis_text: String,
    /// Maximum number of entries the pending pool may hold at once; further
    /// submissions are rejected with `Rejection::PendingPoolFull`.
    pub max_pending: usize,
    /// Maximum number of entries a single `mine()` call may seal into one
    /// block; anything beyond that stays pending for the next block.
    pub max_block_entries: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            admission: AdmissionConfig::default(),
            retry_policy: RetryPolicy::default(),
            fingerprint_cache_ttl: DEFAULT_FINGERPRINT_TTL,
            rate_limit_max_requests: DEFAULT_MAX_REQUESTS,
            rate_limit_window: DEFAULT_WINDOW,
            difficulty: DEFAULT_DIFFICULTY,
            allow_empty_blocks: false,
            genesis_text: DEFAULT_GENESIS_TEXT.to_string(),
            max_pending: DEFAULT_MAX_PENDING,
            max_block_entries: DEFAULT_MAX_BLOCK_ENTRIES,
        }
    }
}

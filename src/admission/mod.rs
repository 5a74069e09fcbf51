//! The admission pipeline: every gate a submitted entry must pass before it
//! joins the pending pool.
//!
//! Plays the same role as rishy2211-mlsnitch's `ConsensusEngine::propose_block`
//! running `BlockValidator::validate` before persisting a block, except
//! gating happens per-entry, before the pending pool, rather than per-block
//! at proposal time. Gates run in a fixed order: schema, rate limit,
//! timestamp, duplicate, quality, and derivative-parent checks are all
//! synchronous and run before the semantic oracle is ever called
//! (`pre_gate`); intent classification, the asset-transfer conflict check,
//! the signature check, and the semantic verdict itself all depend on (or
//! piggyback on) the oracle round trip and run afterward (`finalize`), so
//! that the one gate that costs real wall-clock time and money — the LLM
//! call — only ever runs on an entry that has already survived every free
//! check.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::fingerprint::EntryFingerprintCache;
use crate::hashing;
use crate::intent;
use crate::rate_limit::RateLimiter;
use crate::registry::asset::RegistryError as AssetRegistryError;
use crate::registry::derivative::RegistryError as DerivativeRegistryError;
use crate::registry::{AssetRegistry, DerivativeRegistry};
use crate::signing::{self, SigningError};
use crate::types::{Entry, ValidationStatus};
use crate::validation::{self, LlmHandle, RetryPolicy};

/// Whether the semantic oracle is load-bearing for admission. `Optional`
/// (the default) treats an exhausted oracle as an infrastructure fault and
/// admits the entry in degraded mode (`validation_status: Pending`).
/// `Required` treats the same exhaustion as a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPolicy {
    Required,
    Optional,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        ValidationPolicy::Optional
    }
}

/// Configuration for every gate in the pipeline and the LLM retry policy.
#[derive(Clone, Debug)]
pub struct AdmissionConfig {
    pub max_content_bytes: usize,
    pub max_author_bytes: usize,
    pub max_intent_bytes: usize,
    pub require_signature: bool,
    pub retry_policy: RetryPolicy,
    /// How far into the past an entry's timestamp may fall behind `now`.
    pub timestamp_past_window: Duration,
    /// How far into the future an entry's timestamp may lead `now`.
    pub timestamp_future_window: Duration,
    /// Minimum character count a submission's content must clear.
    pub min_content_chars: usize,
    /// Maximum fraction of content that may be one repeated character.
    pub max_repetition_ratio: f64,
    /// Maximum fraction of content that may be non-printable control bytes.
    pub max_non_printable_fraction: f64,
    /// How to treat an exhausted semantic oracle call at gate 10.
    pub validation_policy: ValidationPolicy,
}

pub const DEFAULT_TIMESTAMP_PAST_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_TIMESTAMP_FUTURE_WINDOW: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_MIN_CONTENT_CHARS: usize = 3;
pub const DEFAULT_MAX_REPETITION_RATIO: f64 = 0.8;
pub const DEFAULT_MAX_NON_PRINTABLE_FRACTION: f64 = 0.3;

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_content_bytes: 8192,
            max_author_bytes: 256,
            max_intent_bytes: 256,
            require_signature: true,
            retry_policy: RetryPolicy::default(),
            timestamp_past_window: DEFAULT_TIMESTAMP_PAST_WINDOW,
            timestamp_future_window: DEFAULT_TIMESTAMP_FUTURE_WINDOW,
            min_content_chars: DEFAULT_MIN_CONTENT_CHARS,
            max_repetition_ratio: DEFAULT_MAX_REPETITION_RATIO,
            max_non_printable_fraction: DEFAULT_MAX_NON_PRINTABLE_FRACTION,
            validation_policy: ValidationPolicy::default(),
        }
    }
}

/// The full rejection taxonomy: every way an entry can fail to be admitted.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("content exceeds {max} bytes ({actual} bytes submitted)")]
    ContentTooLarge { max: usize, actual: usize },
    #[error("author exceeds {max} bytes ({actual} bytes submitted)")]
    AuthorTooLarge { max: usize, actual: usize },
    #[error("intent exceeds {max} bytes ({actual} bytes submitted)")]
    IntentTooLarge { max: usize, actual: usize },
    #[error("content must not be empty")]
    EmptyContent,
    #[error("metadata key '{0}' is reserved for internal use")]
    ProtectedMetadataKey(String),
    #[error("signature verification failed: {0}")]
    SignatureInvalid(#[source] SigningError),
    #[error("author has exceeded the submission rate limit")]
    RateLimited,
    #[error("entry timestamp is outside the accepted clock-skew window")]
    ClockSkew,
    #[error("entry timestamp precedes the latest sealed block")]
    TimestampRegression,
    #[error("content is a duplicate of a recently submitted entry")]
    DuplicateContent,
    #[error("content failed a quality heuristic: {0}")]
    LowQuality(String),
    #[error("parent ref points at an entry that is not yet sealed")]
    UnknownParent(#[source] DerivativeRegistryError),
    #[error("asset transfer was rejected: {0}")]
    AssetConflict(#[source] AssetRegistryError),
    #[error("semantic validator rejected this entry as invalid")]
    SemanticallyInvalid,
    #[error("semantic validator needs clarification before this entry can be admitted")]
    NeedsClarification,
    #[error("semantic validator is unavailable and validation is required")]
    ValidationUnavailable,
    #[error("pending pool is at capacity")]
    PendingPoolFull,
    #[error("failed to compute entry fingerprint: {0}")]
    Canonicalization(#[from] hashing::CanonicalizationError),
}

/// Mutable registries and caches the pipeline consults and updates. Owned
/// by `ChainState`, borrowed here for the duration of one admission call.
pub struct AdmissionContext<'a> {
    pub fingerprint_cache: &'a mut EntryFingerprintCache,
    pub rate_limiter: &'a mut RateLimiter,
    pub asset_registry: &'a mut AssetRegistry,
    pub derivative_registry: &'a DerivativeRegistry,
    pub llm: &'a dyn LlmHandle,
    /// Timestamp of the most recently sealed block, used by the timestamp
    /// gate to reject entries that regress behind the chain's own clock.
    pub latest_block_timestamp: DateTime<Utc>,
}

fn schema_gate(entry: &Entry, config: &AdmissionConfig) -> Result<(), Rejection> {
    if entry.content.is_empty() {
        return Err(Rejection::EmptyContent);
    }
    if entry.content.len() > config.max_content_bytes {
        return Err(Rejection::ContentTooLarge {
            max: config.max_content_bytes,
            actual: entry.content.len(),
        });
    }
    if entry.author.len() > config.max_author_bytes {
        return Err(Rejection::AuthorTooLarge {
            max: config.max_author_bytes,
            actual: entry.author.len(),
        });
    }
    if entry.intent.len() > config.max_intent_bytes {
        return Err(Rejection::IntentTooLarge {
            max: config.max_intent_bytes,
            actual: entry.intent.len(),
        });
    }
    if let Some(key) = entry
        .metadata
        .keys()
        .find(|k| crate::types::PROTECTED_METADATA_KEYS.contains(&k.as_str()))
    {
        return Err(Rejection::ProtectedMetadataKey(key.clone()));
    }
    Ok(())
}

fn timestamp_gate(
    entry: &Entry,
    config: &AdmissionConfig,
    latest_block_timestamp: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), Rejection> {
    let past = ChronoDuration::from_std(config.timestamp_past_window).unwrap_or_else(|_| ChronoDuration::zero());
    let future = ChronoDuration::from_std(config.timestamp_future_window).unwrap_or_else(|_| ChronoDuration::zero());
    if entry.timestamp < now - past || entry.timestamp > now + future {
        return Err(Rejection::ClockSkew);
    }
    if entry.timestamp < latest_block_timestamp {
        return Err(Rejection::TimestampRegression);
    }
    Ok(())
}

/// Rejects content that's too short, dominated by one repeated character, or
/// mostly non-printable control bytes — cheap heuristics that catch
/// obviously junk submissions before they reach the semantic oracle.
fn quality_gate(entry: &Entry, config: &AdmissionConfig) -> Result<(), Rejection> {
    let content = &entry.content;
    let char_count = content.chars().count();
    if char_count < config.min_content_chars {
        return Err(Rejection::LowQuality(format!(
            "content has {char_count} characters, below the minimum of {}",
            config.min_content_chars
        )));
    }

    let mut frequency: HashMap<char, usize> = HashMap::new();
    let mut non_printable = 0usize;
    for c in content.chars() {
        *frequency.entry(c).or_insert(0) += 1;
        if c.is_control() && c != '\n' && c != '\r' && c != '\t' {
            non_printable += 1;
        }
    }

    let non_printable_fraction = non_printable as f64 / char_count as f64;
    if non_printable_fraction > config.max_non_printable_fraction {
        return Err(Rejection::LowQuality(
            "content exceeds the allowed non-printable character fraction".to_string(),
        ));
    }

    let most_common = frequency.values().copied().max().unwrap_or(0);
    let repetition_ratio = most_common as f64 / char_count as f64;
    if repetition_ratio > config.max_repetition_ratio {
        return Err(Rejection::LowQuality(
            "content is dominated by a single repeated character".to_string(),
        ));
    }

    Ok(())
}

/// What the synchronous pre-gates reserved on behalf of an entry still
/// awaiting its semantic verdict: its dedup fingerprint, so it can be
/// recorded once the verdict comes back.
pub struct Reservation {
    fingerprint: hashing::Hash256,
}

/// Runs every gate that doesn't need the semantic oracle, in spec order:
/// schema (1), rate limit (2), timestamp (3), duplicate (4), quality (5),
/// derivative parent refs (6). Callers that need to release their lock
/// across the LLM call (see `ChainState::submit`) run this, then call
/// [`validation::validate_entry`] lock-free, then call [`finalize`].
pub fn pre_gate(entry: &Entry, config: &AdmissionConfig, ctx: &mut AdmissionContext<'_>, now: DateTime<Utc>) -> Result<Reservation, Rejection> {
    schema_gate(entry, config)?;

    if !ctx.rate_limiter.check(&entry.author, now) {
        return Err(Rejection::RateLimited);
    }

    timestamp_gate(entry, config, ctx.latest_block_timestamp, now)?;

    let fingerprint = hashing::fingerprint_of(&entry.dedup_key())?;
    if ctx.fingerprint_cache.contains(&fingerprint, now) {
        return Err(Rejection::DuplicateContent);
    }

    quality_gate(entry, config)?;

    ctx.derivative_registry
        .validate_parent_refs(entry)
        .map_err(Rejection::UnknownParent)?;

    Ok(Reservation { fingerprint })
}

/// Runs the gates that depend on the semantic oracle's response — intent
/// classification (7), asset-transfer conflict (8), signature (9), and the
/// semantic verdict itself (10) — then commits the entry (11): recording
/// its fingerprint and rate-limit usage and filling in its
/// `validation_status`/`validation_paraphrases`.
///
/// The intent classifier's slow path reuses `outcome.intent_is_asset_transfer`
/// (the same oracle call gate 10 already makes) rather than issuing a
/// second LLM round trip; its result is what actually decides whether the
/// asset registry is touched, not just a disagreement log line.
#[instrument(skip(entry, reservation, outcome, config, ctx), fields(author = %entry.author))]
pub fn finalize(
    mut entry: Entry,
    reservation: Reservation,
    outcome: validation::SemanticOutcome,
    config: &AdmissionConfig,
    ctx: &mut AdmissionContext<'_>,
    now: DateTime<Utc>,
) -> Result<Entry, Rejection> {
    // Gate 7: intent classification. Advisory routing only -- it decides
    // whether gate 8 treats this entry as a transfer, never a rejection in
    // its own right.
    let intent_decision = intent::resolve(&entry, outcome.intent_is_asset_transfer);

    // Gate 8: asset-transfer conflict.
    if intent_decision.is_transfer {
        if let (Some(asset_id), Some(to)) = (entry.asset_id().map(str::to_string), entry.asset_to().map(str::to_string)) {
            ctx.asset_registry
                .begin_transfer(&asset_id, &entry.author, &to)
                .map_err(Rejection::AssetConflict)?;
        }
    } else if let Some(asset_id) = entry.asset_id().map(str::to_string) {
        ctx.asset_registry.register_if_new(&asset_id, &entry.author);
    }

    // Gate 9: signature.
    if config.require_signature {
        signing::verify_entry_signature(&entry).map_err(Rejection::SignatureInvalid)?;
    }

    // Gate 10: semantic verdict interpretation.
    match outcome.status {
        ValidationStatus::Invalid => {
            warn!(author = %entry.author, issues = ?outcome.issues, "semantic validator rejected entry");
            return Err(Rejection::SemanticallyInvalid);
        }
        ValidationStatus::NeedsClarification => return Err(Rejection::NeedsClarification),
        ValidationStatus::Error => {
            if config.validation_policy == ValidationPolicy::Required {
                return Err(Rejection::ValidationUnavailable);
            }
            entry.validation_status = ValidationStatus::Pending;
        }
        ValidationStatus::Valid => entry.validation_status = ValidationStatus::Valid,
        ValidationStatus::Pending => unreachable!("the oracle never returns Pending directly"),
    }
    entry.validation_paraphrases = outcome.paraphrases;

    // Gate 11: commit.
    ctx.fingerprint_cache.record(reservation.fingerprint, now);
    ctx.rate_limiter.record(&entry.author, now);

    info!(author = %entry.author, status = ?entry.validation_status, "entry admitted to pending pool");
    Ok(entry)
}

/// Runs `entry` through every admission gate in one call, holding `ctx`'s
/// lock (whatever the caller uses to guard it) for the full semantic
/// validation round trip. Convenient for tests and for callers, like the
/// demo binary, that don't need the lock-splitting `pre_gate`/`finalize`
/// split `ChainState::submit` uses.
pub async fn admit_entry(
    entry: Entry,
    config: &AdmissionConfig,
    ctx: &mut AdmissionContext<'_>,
    now: DateTime<Utc>,
) -> Result<Entry, Rejection> {
    let reservation = pre_gate(&entry, config, ctx, now)?;
    let outcome = validation::validate_entry(ctx.llm, &entry.content, &entry.author, &entry.intent, &config.retry_policy).await;
    finalize(entry, reservation, outcome, config, ctx, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;
    use crate::validation::{LlmResponse, LlmVerdict, NullLlmHandle, ValidatorError};
    use chrono::Utc;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration as StdDuration;

    struct FixedHandle(LlmVerdict);

    impl LlmHandle for FixedHandle {
        fn validate<'a>(
            &'a self,
            _prompt: &'a crate::validation::LlmPrompt,
        ) -> Pin<Box<dyn Future<Output = Result<LlmResponse, ValidatorError>> + Send + 'a>> {
            let verdict = self.0;
            Box::pin(async move {
                Ok(LlmResponse {
                    verdict,
                    paraphrases: vec!["understood".to_string()],
                    intent_is_asset_transfer: false,
                    confidence: 1.0,
                    reasoning: String::new(),
                    issues: Vec::new(),
                })
            })
        }
    }

    fn sample_entry() -> Entry {
        Entry::new(
            "Alice notes that the sky is blue today".to_string(),
            "alice".to_string(),
            "note".to_string(),
            Utc::now(),
            Metadata::new(),
        )
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            base_delay: StdDuration::from_millis(1),
            max_delay: StdDuration::from_millis(1),
            per_attempt_timeout: StdDuration::from_millis(200),
        }
    }

    fn fast_config() -> AdmissionConfig {
        AdmissionConfig {
            require_signature: false,
            retry_policy: fast_policy(),
            ..AdmissionConfig::default()
        }
    }

    #[tokio::test]
    async fn valid_unsigned_entry_is_admitted_when_signature_not_required() {
        let mut cache = EntryFingerprintCache::with_default_ttl();
        let mut limiter = RateLimiter::with_defaults();
        let mut assets = AssetRegistry::new();
        let derivatives = DerivativeRegistry::new();
        let handle = FixedHandle(LlmVerdict::Valid);
        let mut ctx = AdmissionContext {
            fingerprint_cache: &mut cache,
            rate_limiter: &mut limiter,
            asset_registry: &mut assets,
            derivative_registry: &derivatives,
            llm: &handle,
            latest_block_timestamp: Utc::now(),
        };
        let config = fast_config();
        let result = admit_entry(sample_entry(), &config, &mut ctx, Utc::now()).await;
        assert!(result.is_ok());
        assert_eq!(result.unwrap().validation_status, ValidationStatus::Valid);
    }

    #[tokio::test]
    async fn invalid_verdict_rejects_the_entry() {
        let mut cache = EntryFingerprintCache::with_default_ttl();
        let mut limiter = RateLimiter::with_defaults();
        let mut assets = AssetRegistry::new();
        let derivatives = DerivativeRegistry::new();
        let handle = FixedHandle(LlmVerdict::Invalid);
        let mut ctx = AdmissionContext {
            fingerprint_cache: &mut cache,
            rate_limiter: &mut limiter,
            asset_registry: &mut assets,
            derivative_registry: &derivatives,
            llm: &handle,
            latest_block_timestamp: Utc::now(),
        };
        let config = fast_config();
        let result = admit_entry(sample_entry(), &config, &mut ctx, Utc::now()).await;
        assert!(matches!(result, Err(Rejection::SemanticallyInvalid)));
    }

    #[tokio::test]
    async fn needs_clarification_verdict_rejects_the_entry() {
        let mut cache = EntryFingerprintCache::with_default_ttl();
        let mut limiter = RateLimiter::with_defaults();
        let mut assets = AssetRegistry::new();
        let derivatives = DerivativeRegistry::new();
        let handle = FixedHandle(LlmVerdict::NeedsClarification);
        let mut ctx = AdmissionContext {
            fingerprint_cache: &mut cache,
            rate_limiter: &mut limiter,
            asset_registry: &mut assets,
            derivative_registry: &derivatives,
            llm: &handle,
            latest_block_timestamp: Utc::now(),
        };
        let config = fast_config();
        let result = admit_entry(sample_entry(), &config, &mut ctx, Utc::now()).await;
        assert!(matches!(result, Err(Rejection::NeedsClarification)));
    }

    #[tokio::test]
    async fn duplicate_content_is_rejected_on_second_submission() {
        let mut cache = EntryFingerprintCache::with_default_ttl();
        let mut limiter = RateLimiter::with_defaults();
        let mut assets = AssetRegistry::new();
        let derivatives = DerivativeRegistry::new();
        let handle = FixedHandle(LlmVerdict::Valid);
        let config = fast_config();
        let now = Utc::now();
        {
            let mut ctx = AdmissionContext {
                fingerprint_cache: &mut cache,
                rate_limiter: &mut limiter,
                asset_registry: &mut assets,
                derivative_registry: &derivatives,
                llm: &handle,
                latest_block_timestamp: now,
            };
            admit_entry(sample_entry(), &config, &mut ctx, now).await.unwrap();
        }
        let mut ctx = AdmissionContext {
            fingerprint_cache: &mut cache,
            rate_limiter: &mut limiter,
            asset_registry: &mut assets,
            derivative_registry: &derivatives,
            llm: &handle,
            latest_block_timestamp: now,
        };
        let result = admit_entry(sample_entry(), &config, &mut ctx, now).await;
        assert!(matches!(result, Err(Rejection::DuplicateContent)));
    }

    #[tokio::test]
    async fn oracle_exhaustion_admits_with_pending_status_under_optional_policy() {
        let mut cache = EntryFingerprintCache::with_default_ttl();
        let mut limiter = RateLimiter::with_defaults();
        let mut assets = AssetRegistry::new();
        let derivatives = DerivativeRegistry::new();
        let handle = NullLlmHandle;
        let mut ctx = AdmissionContext {
            fingerprint_cache: &mut cache,
            rate_limiter: &mut limiter,
            asset_registry: &mut assets,
            derivative_registry: &derivatives,
            llm: &handle,
            latest_block_timestamp: Utc::now(),
        };
        let config = fast_config();
        assert_eq!(config.validation_policy, ValidationPolicy::Optional);
        let result = admit_entry(sample_entry(), &config, &mut ctx, Utc::now()).await;
        assert_eq!(result.unwrap().validation_status, ValidationStatus::Pending);
    }

    #[tokio::test]
    async fn oracle_exhaustion_is_rejected_under_required_policy() {
        let mut cache = EntryFingerprintCache::with_default_ttl();
        let mut limiter = RateLimiter::with_defaults();
        let mut assets = AssetRegistry::new();
        let derivatives = DerivativeRegistry::new();
        let handle = NullLlmHandle;
        let mut ctx = AdmissionContext {
            fingerprint_cache: &mut cache,
            rate_limiter: &mut limiter,
            asset_registry: &mut assets,
            derivative_registry: &derivatives,
            llm: &handle,
            latest_block_timestamp: Utc::now(),
        };
        let config = AdmissionConfig {
            validation_policy: ValidationPolicy::Required,
            ..fast_config()
        };
        let result = admit_entry(sample_entry(), &config, &mut ctx, Utc::now()).await;
        assert!(matches!(result, Err(Rejection::ValidationUnavailable)));
    }

    #[tokio::test]
    async fn timestamp_far_in_the_future_is_rejected_as_clock_skew() {
        let mut cache = EntryFingerprintCache::with_default_ttl();
        let mut limiter = RateLimiter::with_defaults();
        let mut assets = AssetRegistry::new();
        let derivatives = DerivativeRegistry::new();
        let handle = FixedHandle(LlmVerdict::Valid);
        let mut ctx = AdmissionContext {
            fingerprint_cache: &mut cache,
            rate_limiter: &mut limiter,
            asset_registry: &mut assets,
            derivative_registry: &derivatives,
            llm: &handle,
            latest_block_timestamp: Utc::now(),
        };
        let config = fast_config();
        let mut entry = sample_entry();
        entry.timestamp = Utc::now() + ChronoDuration::hours(1);
        let result = admit_entry(entry, &config, &mut ctx, Utc::now()).await;
        assert!(matches!(result, Err(Rejection::ClockSkew)));
    }

    #[tokio::test]
    async fn timestamp_before_the_latest_block_is_rejected_as_regression() {
        let mut cache = EntryFingerprintCache::with_default_ttl();
        let mut limiter = RateLimiter::with_defaults();
        let mut assets = AssetRegistry::new();
        let derivatives = DerivativeRegistry::new();
        let handle = FixedHandle(LlmVerdict::Valid);
        let now = Utc::now();
        let mut ctx = AdmissionContext {
            fingerprint_cache: &mut cache,
            rate_limiter: &mut limiter,
            asset_registry: &mut assets,
            derivative_registry: &derivatives,
            llm: &handle,
            latest_block_timestamp: now,
        };
        let config = fast_config();
        let mut entry = sample_entry();
        entry.timestamp = now - ChronoDuration::minutes(1);
        let result = admit_entry(entry, &config, &mut ctx, now).await;
        assert!(matches!(result, Err(Rejection::TimestampRegression)));
    }

    #[tokio::test]
    async fn low_quality_content_is_rejected() {
        let mut cache = EntryFingerprintCache::with_default_ttl();
        let mut limiter = RateLimiter::with_defaults();
        let mut assets = AssetRegistry::new();
        let derivatives = DerivativeRegistry::new();
        let handle = FixedHandle(LlmVerdict::Valid);
        let mut ctx = AdmissionContext {
            fingerprint_cache: &mut cache,
            rate_limiter: &mut limiter,
            asset_registry: &mut assets,
            derivative_registry: &derivatives,
            llm: &handle,
            latest_block_timestamp: Utc::now(),
        };
        let config = fast_config();
        let mut entry = sample_entry();
        entry.content = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string();
        let result = admit_entry(entry, &config, &mut ctx, Utc::now()).await;
        assert!(matches!(result, Err(Rejection::LowQuality(_))));
    }
}

//! Retry policy wrapping a single [`LlmHandle`] call: timeout, exponential
//! backoff with jitter, and a bounded attempt count.
//!
//! No module in rishy2211-mlsnitch retries the ML call (`HttpMlVerifier::verify` is a
//! one-shot blocking call); this is grounded on the corpus's general
//! `rand`-for-jitter idiom (used across the retrieved example files wherever
//! a backoff sleeps between attempts) generalized into an explicit retry
//! loop around rishy2211-mlsnitch's single-call trait shape.

use std::time::Duration;

use rand::Rng;

use super::llm::{LlmHandle, LlmPrompt, LlmResponse, ValidatorError};

/// Tuning knobs for [`call_with_retry`].
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub per_attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            per_attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of exhausting (or succeeding within) a retry budget.
pub enum RetryOutcome {
    Succeeded(LlmResponse),
    /// Every attempt failed; the last error is kept for logging.
    Exhausted(ValidatorError),
}

fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = policy.base_delay.saturating_mul(1u32 << attempt.min(16));
    let capped = exp.min(policy.max_delay);
    let jitter_frac: f64 = rand::thread_rng().gen_range(0.9..1.1);
    capped.mul_f64(jitter_frac)
}

/// Calls `handle.validate(prompt)` up to `policy.max_attempts` times,
/// applying a per-attempt timeout and exponential backoff with jitter
/// between attempts. Fatal errors end the retry loop immediately; only
/// transient errors and timeouts are retried.
pub async fn call_with_retry(
    handle: &dyn LlmHandle,
    prompt: &LlmPrompt,
    policy: &RetryPolicy,
) -> RetryOutcome {
    let mut last_err = ValidatorError::Transient("no attempts made".to_string());

    for attempt in 0..policy.max_attempts {
        let attempt_result = tokio::time::timeout(policy.per_attempt_timeout, handle.validate(prompt)).await;

        match attempt_result {
            Ok(Ok(response)) => return RetryOutcome::Succeeded(response),
            Ok(Err(err)) => {
                let transient = err.is_transient();
                last_err = err;
                if !transient {
                    return RetryOutcome::Exhausted(last_err);
                }
            }
            Err(_elapsed) => {
                last_err = ValidatorError::Transient(format!(
                    "validator call exceeded {:?} timeout",
                    policy.per_attempt_timeout
                ));
            }
        }

        if attempt + 1 < policy.max_attempts {
            tokio::time::sleep(backoff_delay(policy, attempt)).await;
        }
    }

    RetryOutcome::Exhausted(last_err)
}

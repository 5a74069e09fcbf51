//! The semantic validator: LLM-based "Proof of Understanding".
//!
//! Plays the same role as rishy2211-mlsnitch's `MlValidity<V>` in its
//! validator stack — delegate the actual correctness judgment to an external,
//! possibly slow, possibly wrong oracle, wrapped in a policy layer (here:
//! sanitize, retry with backoff, interpret the verdict) that the rest of
//! the admission pipeline never has to know about.

pub mod llm;
pub mod retry;
pub mod sanitize;

use tracing::warn;

pub use llm::{HttpLlmHandle, LlmHandle, LlmPrompt, LlmResponse, LlmVerdict, NullLlmHandle, ValidatorError};
pub use retry::RetryPolicy;

use crate::types::ValidationStatus;

/// Result of running an entry through the semantic validator.
pub struct SemanticOutcome {
    pub status: ValidationStatus,
    pub paraphrases: Vec<String>,
    pub intent_is_asset_transfer: bool,
    pub issues: Vec<String>,
}

/// Runs sanitize → prompt → retrying LLM call → status interpretation.
///
/// On exhausted retries this returns `ValidationStatus::Error` (the
/// documented degraded mode) rather than propagating the error, since a
/// failed oracle call is an admission outcome in its own right, not a
/// caller-level failure.
pub async fn validate_entry(
    handle: &dyn LlmHandle,
    content: &str,
    author: &str,
    declared_intent: &str,
    policy: &RetryPolicy,
) -> SemanticOutcome {
    let sanitized = sanitize::sanitize(content);
    if !sanitized.injection_markers_found.is_empty() {
        warn!(
            markers = ?sanitized.injection_markers_found,
            "entry content contains possible prompt-injection markers"
        );
    }

    let prompt = LlmPrompt {
        content: sanitized.text,
        author: author.to_string(),
        declared_intent: declared_intent.to_string(),
    };

    match retry::call_with_retry(handle, &prompt, policy).await {
        retry::RetryOutcome::Succeeded(response) => {
            let status = match response.verdict {
                LlmVerdict::Valid => ValidationStatus::Valid,
                LlmVerdict::Invalid => ValidationStatus::Invalid,
                LlmVerdict::NeedsClarification => ValidationStatus::NeedsClarification,
            };
            SemanticOutcome {
                status,
                paraphrases: response.paraphrases,
                intent_is_asset_transfer: response.intent_is_asset_transfer,
                issues: response.issues,
            }
        }
        retry::RetryOutcome::Exhausted(err) => {
            warn!(error = %err, "semantic validator exhausted retries, falling into degraded mode");
            SemanticOutcome {
                status: ValidationStatus::Error,
                paraphrases: Vec::new(),
                intent_is_asset_transfer: false,
                issues: Vec::new(),
            }
        }
    }
}

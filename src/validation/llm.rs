//! The external semantic-validation oracle.
//!
//! Grounded on rishy2211-mlsnitch's [`MlVerifier`] trait (`validation/ml.rs`) and
//! its HTTP implementation (`ml_client/http.rs`): an abstract trait so the
//! admission pipeline never depends on a concrete transport, plus one real
//! HTTP-backed implementation. `LlmHandle::validate` is async (unlike
//! `MlVerifier::verify`'s blocking call) because the chain-mutation lock
//! must be released across this call — see `ChainState::submit` — so the
//! trait method is hand-desugared to return a boxed future rather than
//! pulling in an async-trait-style proc macro the corpus doesn't otherwise
//! depend on.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while contacting the semantic validation oracle.
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// Worth retrying: timeouts, connection failures, 5xx responses.
    #[error("transient validator error: {0}")]
    Transient(String),
    /// Not worth retrying: malformed response, 4xx, schema mismatch.
    #[error("fatal validator error: {0}")]
    Fatal(String),
}

impl ValidatorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ValidatorError::Transient(_))
    }
}

/// Structured verdict the admission pipeline's semantic gate asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmVerdict {
    Valid,
    Invalid,
    NeedsClarification,
}

/// Raw response from the oracle: a verdict plus the paraphrases it used to
/// demonstrate comprehension of the submitted prose.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    pub verdict: LlmVerdict,
    #[serde(default)]
    pub paraphrases: Vec<String>,
    #[serde(default)]
    pub intent_is_asset_transfer: bool,
    /// The oracle's confidence in `verdict`, `0.0`-`1.0`.
    #[serde(default)]
    pub confidence: f64,
    /// Free-text justification for `verdict`, for operator-facing logging.
    #[serde(default)]
    pub reasoning: String,
    /// Specific problems the oracle found with the submitted content, surfaced
    /// to operators when `verdict` is `Invalid`.
    #[serde(default)]
    pub issues: Vec<String>,
}

/// A sanitized prompt ready to send to the oracle.
#[derive(Debug, Clone, Serialize)]
pub struct LlmPrompt {
    pub content: String,
    pub author: String,
    pub declared_intent: String,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Abstract semantic validation oracle.
pub trait LlmHandle: Send + Sync {
    /// Submits `prompt` for a single validation attempt. Implementations
    /// should not retry internally; retrying with backoff is the caller's
    /// (`validation::retry`) job so timing policy stays in one place.
    fn validate<'a>(&'a self, prompt: &'a LlmPrompt) -> BoxFuture<'a, Result<LlmResponse, ValidatorError>>;
}

/// A handle that always fails transiently. Used when no real oracle is
/// configured; the admission pipeline's retry policy exhausts its attempts
/// against this handle and falls into the documented degraded mode
/// (`ValidationStatus::Error`) rather than silently admitting anything.
pub struct NullLlmHandle;

impl LlmHandle for NullLlmHandle {
    fn validate<'a>(&'a self, _prompt: &'a LlmPrompt) -> BoxFuture<'a, Result<LlmResponse, ValidatorError>> {
        Box::pin(async { Err(ValidatorError::Transient("no LLM oracle configured".to_string())) })
    }
}

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    content: &'a str,
    author: &'a str,
    declared_intent: &'a str,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    verdict: LlmVerdict,
    #[serde(default)]
    paraphrases: Vec<String>,
    #[serde(default)]
    intent_is_asset_transfer: bool,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    issues: Vec<String>,
}

/// HTTP-based oracle client, the async analogue of rishy2211-mlsnitch's
/// `HttpMlVerifier`.
pub struct HttpLlmHandle {
    base_url: String,
    client: Client,
}

impl HttpLlmHandle {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ValidatorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ValidatorError::Fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

impl LlmHandle for HttpLlmHandle {
    fn validate<'a>(&'a self, prompt: &'a LlmPrompt) -> BoxFuture<'a, Result<LlmResponse, ValidatorError>> {
        Box::pin(async move {
            let url = self.endpoint("/validate");
            let body = ValidateRequest {
                content: &prompt.content,
                author: &prompt.author,
                declared_intent: &prompt.declared_intent,
            };

            let resp = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| ValidatorError::Transient(format!("HTTP POST {url} failed: {e}")))?;

            let status = resp.status();
            if status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT {
                return Err(ValidatorError::Transient(format!("oracle returned HTTP {status}")));
            }
            if !status.is_success() {
                return Err(ValidatorError::Fatal(format!("oracle returned HTTP {status}")));
            }

            let parsed: ValidateResponse = resp
                .json()
                .await
                .map_err(|e| ValidatorError::Fatal(format!("malformed oracle response: {e}")))?;

            Ok(LlmResponse {
                verdict: parsed.verdict,
                paraphrases: parsed.paraphrases,
                intent_is_asset_transfer: parsed.intent_is_asset_transfer,
                confidence: parsed.confidence,
                reasoning: parsed.reasoning,
                issues: parsed.issues,
            })
        })
    }
}

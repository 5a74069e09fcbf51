//! Asset-transfer intent classification: a cheap keyword-plus-metadata fast
//! path, falling back to the semantic oracle's own judgment when the fast
//! path is ambiguous or the submitter explicitly asks for it.
//!
//! Mirrors rishy2211-mlsnitch's layered-validator shape (`BaseValidity` running
//! before `MlValidity` in `CombinedValidator`): a cheap structural check
//! runs first and, on agreement with the metadata the entry itself carries,
//! is authoritative on its own; only on disagreement or an explicit
//! escalation request does the decision defer to the oracle. The slow path
//! reuses `intent_is_asset_transfer` from the same oracle response the
//! semantic gate already requested, rather than a second round trip.

use crate::types::{Entry, MetadataValue};

pub const TRANSFER_KEYWORDS: &[&str] = &[
    "transfer",
    "send to",
    "gift",
    "sell to",
    "give ownership",
    "hand over",
    "assign to",
];

/// Metadata key a submitter can set to force the slow path even when the
/// fast path would otherwise agree with itself.
const TRANSFER_CLASSIFICATION_REQUIRED_KEY: &str = "transfer_classification_required";

/// Gate 7's routing decision: whether this entry should be treated as an
/// asset transfer by gate 8, and whether that answer came from the cheap
/// fast path or had to defer to the oracle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntentDecision {
    pub is_transfer: bool,
    pub confidence: f64,
    pub deferred_to_slow_path: bool,
}

/// Cheap, non-authoritative scan for transfer-suggestive wording.
pub fn keyword_hint(content: &str) -> bool {
    let lowercase = content.to_lowercase();
    TRANSFER_KEYWORDS.iter().any(|kw| lowercase.contains(kw))
}

fn metadata_declares_transfer(entry: &Entry) -> bool {
    entry.asset_id().is_some() && entry.asset_to().is_some()
}

fn slow_path_required(entry: &Entry) -> bool {
    matches!(
        entry.metadata.get(TRANSFER_CLASSIFICATION_REQUIRED_KEY),
        Some(MetadataValue::Bool(true))
    )
}

/// Resolves gate 7: if the surface wording and the declared `asset.*`
/// metadata agree, and the submitter hasn't asked for escalation, that
/// agreement is authoritative with full confidence. Otherwise the decision
/// defers to whatever the semantic oracle's own call already concluded.
pub fn resolve(entry: &Entry, llm_says_transfer: bool) -> IntentDecision {
    let metadata_says_transfer = metadata_declares_transfer(entry);
    let hint = keyword_hint(&entry.content);

    if !slow_path_required(entry) && hint == metadata_says_transfer {
        return IntentDecision {
            is_transfer: metadata_says_transfer,
            confidence: 1.0,
            deferred_to_slow_path: false,
        };
    }

    IntentDecision {
        is_transfer: llm_says_transfer,
        confidence: if llm_says_transfer { 1.0 } else { 0.0 },
        deferred_to_slow_path: true,
    }
}

//! Sanitizes entry content before it is interpolated into an LLM prompt.
//!
//! This is defense-in-depth, not the authority on validity — the LLM call
//! itself is authoritative for semantic acceptance. Sanitization exists only
//! to stop an entry's own prose from being mistaken for prompt instructions.

use unicode_normalization::UnicodeNormalization;

/// Maximum number of `char`s of content forwarded to the LLM. Longer
/// content is truncated; truncation is recorded so callers can log it.
pub const MAX_CONTENT_CHARS: usize = 4000;

/// Delimiters used to frame untrusted content in a prompt. Any occurrence
/// of these sequences inside submitted content is stripped so a submitter
/// cannot forge a fake "end of data" boundary.
const FRAMING_DELIMITERS: &[&str] = &["```", "<<<DATA>>>", "<<<END_DATA>>>", "<<<INSTRUCTION>>>"];

/// Substrings whose presence suggests an attempt at prompt injection. This
/// is a coarse heuristic surfaced for logging; it never blocks admission by
/// itself (only the LLM's own judgment does that).
const INJECTION_MARKERS: &[&str] = &[
    "ignore previous instructions",
    "ignore all previous",
    "disregard the above",
    "system prompt",
    "you are now",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedContent {
    pub text: String,
    pub truncated: bool,
    pub injection_markers_found: Vec<&'static str>,
}

/// NFKC-normalizes, truncates, strips framing delimiters, and scans for
/// injection markers in `content`.
pub fn sanitize(content: &str) -> SanitizedContent {
    let normalized: String = content.nfkc().collect();

    let mut stripped = normalized;
    for delim in FRAMING_DELIMITERS {
        stripped = stripped.replace(delim, "");
    }

    let truncated = stripped.chars().count() > MAX_CONTENT_CHARS;
    let text: String = stripped.chars().take(MAX_CONTENT_CHARS).collect();

    let lowercase = text.to_lowercase();
    let injection_markers_found = INJECTION_MARKERS
        .iter()
        .copied()
        .filter(|marker| lowercase.contains(marker))
        .collect();

    SanitizedContent {
        text,
        truncated,
        injection_markers_found,
    }
}

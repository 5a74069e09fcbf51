//! Ed25519 signature verification over an entry's signable canonical form.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use thiserror::Error;

use crate::hashing::{self, CanonicalizationError, Hash256};
use crate::types::Entry;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("entry is missing a signature or public key")]
    Missing,
    #[error("public key is malformed: {0}")]
    MalformedKey(String),
    #[error("signature is malformed: {0}")]
    MalformedSignature(String),
    #[error("signature does not verify against the entry's canonical bytes")]
    Invalid,
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),
}

/// First 16 hex characters of SHA-256(public key) — a short, human-loggable
/// stand-in for the full key.
pub fn signer_fingerprint(public_key_bytes: &[u8]) -> String {
    let digest = Hash256::compute(public_key_bytes);
    digest.to_hex()[..16].to_string()
}

/// Verifies `entry`'s signature over its signable canonical form (every
/// field except `signature` and `public_key` itself).
pub fn verify_entry_signature(entry: &Entry) -> Result<String, SigningError> {
    let (sig, pk) = match (&entry.signature, &entry.public_key) {
        (Some(sig), Some(pk)) => (sig, pk),
        _ => return Err(SigningError::Missing),
    };

    let key_bytes: [u8; 32] = pk
        .0
        .as_slice()
        .try_into()
        .map_err(|_| SigningError::MalformedKey("expected 32 bytes".to_string()))?;
    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|e| SigningError::MalformedKey(e.to_string()))?;

    let sig_bytes: [u8; 64] = sig
        .0
        .as_slice()
        .try_into()
        .map_err(|_| SigningError::MalformedSignature("expected 64 bytes".to_string()))?;
    let signature = Signature::from_bytes(&sig_bytes);

    let message = hashing::canonical_bytes(&entry.signable_form())?;
    verifying_key
        .verify(&message, &signature)
        .map_err(|_| SigningError::Invalid)?;

    Ok(signer_fingerprint(&key_bytes))
}

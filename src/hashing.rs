//! Canonicalization and SHA-256 hashing.
//!
//! Every fingerprint, block hash, and persisted byte stream in this crate
//! goes through the same canonical JSON form: object keys sorted
//! lexicographically, no insignificant whitespace, UTF-8 NFC-normalized
//! strings, decimal integers, no `null`. Rehashing any stored value must
//! reproduce the stored hash byte-for-byte.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Number of bytes in a [`Hash256`].
pub const HASH_LEN: usize = 32;

/// A 256-bit SHA-256 digest, used for entry fingerprints and block hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
pub struct Hash256(#[serde(with = "hex_array")] pub [u8; HASH_LEN]);

impl Hash256 {
    /// Computes the SHA-256 digest of `bytes`.
    pub fn compute(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&digest);
        Hash256(out)
    }

    /// Returns the digest as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a lowercase hex string into a digest.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != HASH_LEN {
            return None;
        }
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&bytes);
        Some(Hash256(out))
    }

    /// Returns `true` if the hex representation begins with `difficulty`
    /// leading zero hex digits.
    pub fn has_leading_zero_hex_digits(&self, difficulty: u32) -> bool {
        let hex = self.to_hex();
        hex.bytes().take(difficulty as usize).all(|b| b == b'0')
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

mod hex_array {
    use super::HASH_LEN;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; HASH_LEN], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; HASH_LEN], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        if bytes.len() != HASH_LEN {
            return Err(serde::de::Error::custom("expected 32-byte hex string"));
        }
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&bytes);
        Ok(out)
    }
}

/// Errors raised while canonicalizing a value for hashing or persistence.
#[derive(Debug, Error)]
pub enum CanonicalizationError {
    #[error("value contains a NaN or infinite number")]
    NonFiniteNumber,
    #[error("value contains a disallowed null")]
    NullDisallowed,
    #[error("value contains non-UTF-8 or malformed string data")]
    InvalidUtf8,
    #[error("failed to serialize value: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Serializes `value` to its canonical byte form: JSON with lexicographically
/// sorted keys, no insignificant whitespace, and NFC-normalized strings.
///
/// `serde_json::Value`'s map type is a `BTreeMap` in this crate (the
/// `preserve_order` feature is never enabled), so converting through
/// [`serde_json::to_value`] already yields sorted keys; this function adds
/// the NFC normalization pass and rejects `null`/non-finite numbers.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalizationError> {
    // serde_json's own f64 serializer rejects NaN/Infinity before a `Value`
    // can ever be built, so that case is caught here rather than in `normalize`.
    let json = serde_json::to_value(value).map_err(|e| {
        let msg = e.to_string();
        if msg.contains("NaN") || msg.contains("infinite") {
            CanonicalizationError::NonFiniteNumber
        } else {
            CanonicalizationError::Serde(e)
        }
    })?;
    let normalized = normalize(&json)?;
    Ok(serde_json::to_vec(&normalized)?)
}

fn normalize(value: &serde_json::Value) -> Result<serde_json::Value, CanonicalizationError> {
    use serde_json::Value;
    match value {
        Value::Null => Err(CanonicalizationError::NullDisallowed),
        Value::Bool(_) => Ok(value.clone()),
        Value::Number(_) => Ok(value.clone()),
        Value::String(s) => Ok(Value::String(s.nfc().collect::<String>())),
        Value::Array(items) => {
            let out: Result<Vec<_>, _> = items.iter().map(normalize).collect();
            Ok(Value::Array(out?))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.nfc().collect::<String>(), normalize(v)?);
            }
            Ok(Value::Object(out))
        }
    }
}

/// Computes the canonical SHA-256 fingerprint of any canonicalizable value.
pub fn fingerprint_of<T: Serialize>(value: &T) -> Result<Hash256, CanonicalizationError> {
    let bytes = canonical_bytes(value)?;
    Ok(Hash256::compute(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_roundtrips_through_hex() {
        let h = Hash256::compute(b"hello");
        let hex = h.to_hex();
        let parsed = Hash256::from_hex(&hex).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn canonical_bytes_is_deterministic_regardless_of_field_order() {
        #[derive(Serialize)]
        struct A {
            b: i32,
            a: i32,
        }
        #[derive(Serialize)]
        struct B {
            a: i32,
            b: i32,
        }
        let x = canonical_bytes(&A { b: 2, a: 1 }).unwrap();
        let y = canonical_bytes(&B { a: 1, b: 2 }).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn canonical_bytes_rejects_nan() {
        #[derive(Serialize)]
        struct HasNan {
            x: f64,
        }
        let err = canonical_bytes(&HasNan { x: f64::NAN }).unwrap_err();
        assert!(matches!(err, CanonicalizationError::NonFiniteNumber));
    }

    #[test]
    fn canonical_bytes_rejects_null() {
        #[derive(Serialize)]
        struct HasNull {
            x: Option<i32>,
        }
        let err = canonical_bytes(&HasNull { x: None }).unwrap_err();
        assert!(matches!(err, CanonicalizationError::NullDisallowed));
    }

    #[test]
    fn difficulty_check_counts_leading_zero_hex_digits() {
        let h = Hash256::from_hex(&"0".repeat(64)).unwrap();
        assert!(h.has_leading_zero_hex_digits(5));
        let h2 = Hash256::from_hex(&("00".to_string() + &"f".repeat(62))).unwrap();
        assert!(h2.has_leading_zero_hex_digits(2));
        assert!(!h2.has_leading_zero_hex_digits(3));
    }
}

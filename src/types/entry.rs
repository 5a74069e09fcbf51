//! The ledger's atomic unit of prose: [`Entry`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Author, EntryLocation};

/// Outcome of semantic validation (Proof of Understanding) for an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Pending,
    Valid,
    Invalid,
    NeedsClarification,
    Error,
}

/// Kind of relationship a child entry declares to a parent entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipKind {
    Amendment,
    Extension,
    Response,
    Revision,
    Reference,
    Fulfillment,
}

/// A reference from a child entry to an already-sealed parent entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub location: EntryLocation,
    pub relationship: RelationshipKind,
}

/// A single metadata value. Restricted to JSON primitives so that metadata
/// always serializes deterministically as part of an entry's canonical form
/// (no nested objects/arrays to reorder, no `null`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Number(f64),
    Bool(bool),
}

/// Entry metadata: short keys to primitive values, kept in a `BTreeMap` so
/// iteration order (and therefore canonical serialization) is always
/// lexicographic by key.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Metadata key names the core mutates or derives itself. Writers may never
/// set these directly; doing so fails the schema gate regardless of value.
///
/// This does *not* cover the `asset.*` namespace: those keys are reserved
/// for declaring transfer intent but remain writer-settable.
pub const PROTECTED_METADATA_KEYS: &[&str] = &[
    "validation_status",
    "hash",
    "block_index",
    "block_hash",
    "signature",
    "public_key",
    "signer_fingerprint",
];

/// Raw Ed25519 signature bytes.
#[derive(Clone, Serialize, Deserialize)]
pub struct EntrySignature(#[serde(with = "hex_bytes")] pub Vec<u8>);

/// Raw Ed25519 public key bytes (32 bytes).
#[derive(Clone, Serialize, Deserialize)]
pub struct EntryPublicKey(#[serde(with = "hex_bytes")] pub Vec<u8>);

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A single prose record submitted to the ledger.
///
/// Entries are mutable (in the sense that `validation_status` and
/// `validation_paraphrases` are filled in by the admission pipeline) only
/// up until they are committed into the pending pool; once sealed into a
/// block they are immutable.
#[derive(Clone, Serialize, Deserialize)]
pub struct Entry {
    pub content: String,
    pub author: Author,
    pub intent: String,
    pub timestamp: DateTime<Utc>,
    pub validation_status: ValidationStatus,
    pub validation_paraphrases: Vec<String>,
    pub metadata: Metadata,
    pub parent_refs: Vec<ParentRef>,
    pub signature: Option<EntrySignature>,
    pub public_key: Option<EntryPublicKey>,
}

impl Entry {
    /// Builds a fresh, unvalidated entry as a submitter would present it.
    ///
    /// `validation_status` starts at `Pending` and `validation_paraphrases`
    /// is empty; the admission pipeline fills both in.
    pub fn new(
        content: String,
        author: Author,
        intent: String,
        timestamp: DateTime<Utc>,
        metadata: Metadata,
    ) -> Self {
        Self {
            content,
            author,
            intent,
            timestamp,
            validation_status: ValidationStatus::Pending,
            validation_paraphrases: Vec::new(),
            metadata,
            parent_refs: Vec::new(),
            signature: None,
            public_key: None,
        }
    }

    /// Returns the asset id declared under `asset.id`, if present.
    pub fn asset_id(&self) -> Option<&str> {
        match self.metadata.get("asset.id")? {
            MetadataValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the transfer destination declared under `asset.to`, if present.
    pub fn asset_to(&self) -> Option<&str> {
        match self.metadata.get("asset.to")? {
            MetadataValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// `true` if any metadata key is in [`PROTECTED_METADATA_KEYS`].
    pub fn has_protected_metadata_key(&self) -> bool {
        self.metadata
            .keys()
            .any(|k| PROTECTED_METADATA_KEYS.contains(&k.as_str()))
    }

    /// Canonical form used for fingerprinting: `(content, author, intent)`.
    ///
    /// Deliberately excludes timestamp, metadata, and validation state so
    /// that resubmitting byte-identical prose is recognized as a duplicate
    /// even if the clock or incidental metadata differs.
    pub fn dedup_key(&self) -> DedupKey<'_> {
        DedupKey {
            content: &self.content,
            author: &self.author,
            intent: &self.intent,
        }
    }

    /// Canonical form used for hashing/signing: every field except
    /// `signature` and `public_key`.
    pub fn signable_form(&self) -> SignableEntry<'_> {
        SignableEntry {
            content: &self.content,
            author: &self.author,
            intent: &self.intent,
            timestamp: self.timestamp,
            validation_status: self.validation_status,
            validation_paraphrases: &self.validation_paraphrases,
            metadata: &self.metadata,
            parent_refs: &self.parent_refs,
        }
    }
}

#[derive(Serialize)]
pub struct DedupKey<'a> {
    content: &'a str,
    author: &'a str,
    intent: &'a str,
}

/// A view over an [`Entry`] with the signature fields stripped, used both
/// as the signing input and as the fingerprinting/hashing input.
#[derive(Serialize)]
pub struct SignableEntry<'a> {
    content: &'a str,
    author: &'a str,
    intent: &'a str,
    timestamp: DateTime<Utc>,
    validation_status: ValidationStatus,
    validation_paraphrases: &'a [String],
    metadata: &'a Metadata,
    parent_refs: &'a [ParentRef],
}

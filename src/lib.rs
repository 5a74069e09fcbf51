//! Ledger library crate.
//!
//! This crate provides the core building blocks for a prose-first,
//! append-only ledger whose admission pipeline uses an LLM as a semantic
//! "Proof of Understanding" oracle rather than a signature-only check:
//!
//! - strongly-typed domain types (`types`),
//! - canonical hashing for deterministic fingerprints and signing (`hashing`),
//! - the admission pipeline and its full rejection taxonomy (`admission`),
//! - the semantic validator: sanitize, prompt, retry, interpret (`validation`),
//! - asset-transfer intent classification (`intent`),
//! - signature verification (`signing`),
//! - dedup and rate-limit guards (`fingerprint`, `rate_limit`),
//! - asset and derivative registries rebuilt from sealed history (`registry`),
//! - proof-of-work block assembly (`miner`),
//! - pluggable, atomic persistence (`storage`),
//! - the chain-state facade tying all of the above together (`chain`),
//! - and top-level node configuration (`config`).
//!
//! Higher-level binaries compose these pieces into a running node; see
//! `main.rs` for a minimal one backed by in-memory storage.

pub mod admission;
pub mod chain;
pub mod config;
pub mod fingerprint;
pub mod hashing;
pub mod intent;
pub mod miner;
pub mod rate_limit;
pub mod registry;
pub mod signing;
pub mod storage;
pub mod types;
pub mod validation;

pub use chain::{ChainState, IntegrityError, MineError, SubmitError};
pub use config::LedgerConfig;

pub use storage::{FileStorage, InMemoryStorage, RocksDbConfig, RocksDbStorage, Snapshot, Storage, StorageError, StorageHealth};

pub use registry::{AssetRegistry, DerivativeRegistry};

pub use validation::{HttpLlmHandle, LlmHandle, LlmPrompt, LlmResponse, LlmVerdict, NullLlmHandle, RetryPolicy, ValidatorError};

pub use types::*;

/// Type alias for the default storage backend used by a "typical" node.
pub type DefaultStorage = InMemoryStorage;

/// Type alias for the default semantic validator handle used by a
/// "typical" node talking to a real LLM service over HTTP.
pub type DefaultLlmHandle = HttpLlmHandle;

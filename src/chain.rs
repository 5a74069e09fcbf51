//! `ChainState`: the public facade tying admission, mining, and storage
//! together under the concurrency model this system promises — a single
//! logical writer, many non-blocking readers, and a chain-mutation lock
//! that is released across the admission pipeline's LLM await so a slow
//! oracle call never stalls every other submitter.
//!
//! Grounded on rishy2211-mlsnitch's `ConsensusEngine<S, V, F>` (`consensus/engine.rs`):
//! same "assemble → validate → persist → flip the visible tip" shape, same
//! generic-over-storage-and-validator structure, replaced here by a single
//! concrete struct since this system has one storage slot and one semantic
//! validator rather than rishy2211-mlsnitch's pluggable fork-choice/proposer split.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::admission::{self, AdmissionConfig, AdmissionContext, Rejection};
use crate::config::LedgerConfig;
use crate::fingerprint::EntryFingerprintCache;
use crate::miner::{self, MiningError};
use crate::rate_limit::RateLimiter;
use crate::registry::{AssetRegistry, DerivativeRegistry};
use crate::storage::{AssetsSnapshot, DerivativeEdgeSnapshot, Snapshot, Storage, StorageError, SNAPSHOT_VERSION};
use crate::types::{Author, Block, Entry, EntryLocation};
use crate::validation::LlmHandle;

/// Errors raised while checking the integrity of a loaded or stored chain.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("block at index {index} is corrupt: {reason}")]
    CorruptAt { index: u64, reason: String },
}

/// Errors `ChainState::submit` can return in addition to the admission
/// pipeline's own [`Rejection`] taxonomy.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    /// The chain tip advanced (a block was mined) while this entry's
    /// semantic validation was in flight, invalidating any asset-transfer
    /// reservation or parent-ref assumption the admission gates made
    /// before releasing the lock. The caller should resubmit.
    #[error("chain state changed while this entry was being validated; resubmit")]
    StateChanged,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum MineError {
    #[error(transparent)]
    Mining(#[from] MiningError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("pending pool is empty and empty blocks are not allowed")]
    NothingToMine,
}

/// The mutable, lock-protected heart of the chain: sealed blocks, the
/// pending pool, and the registries derived from sealed state.
struct ChainInner {
    blocks: Vec<Block>,
    pending: Vec<Entry>,
    asset_registry: AssetRegistry,
    derivative_registry: DerivativeRegistry,
}

/// Ties together storage, the admission pipeline, the miner, and the
/// registries/caches the admission pipeline consults.
pub struct ChainState {
    inner: RwLock<ChainInner>,
    storage: Arc<dyn Storage>,
    llm: Arc<dyn LlmHandle>,
    config: LedgerConfig,
    fingerprint_cache: RwLock<EntryFingerprintCache>,
    rate_limiter: RwLock<RateLimiter>,
    /// Bumped every time a block is mined. Used by `submit` to detect
    /// whether the tip moved while its LLM call was in flight.
    mine_epoch: AtomicU64,
}

impl ChainState {
    /// Loads existing state from `storage`, or seeds a fresh genesis block
    /// if storage is empty.
    pub async fn load(
        storage: Arc<dyn Storage>,
        llm: Arc<dyn LlmHandle>,
        config: LedgerConfig,
    ) -> Result<Self, StorageError> {
        let snapshot = storage.load()?;
        let (blocks, pending, fingerprint_entries, rate_limit_history) = match snapshot {
            Some(s) => (s.blocks, s.pending, s.fingerprint_cache, s.rate_limit_history),
            None => {
                let genesis = Block::genesis(Utc::now(), &config.genesis_text)
                    .map_err(|e| StorageError::Write(format!("building genesis block: {e}")))?;
                let blocks = vec![genesis];
                storage.save(&Snapshot {
                    version: SNAPSHOT_VERSION,
                    genesis_text: config.genesis_text.clone(),
                    difficulty: config.difficulty,
                    blocks: blocks.clone(),
                    pending: Vec::new(),
                    fingerprint_cache: Vec::new(),
                    rate_limit_history: Vec::new(),
                    assets: AssetsSnapshot::default(),
                    derivatives: Vec::new(),
                })?;
                (blocks, Vec::new(), Vec::new(), Vec::new())
            }
        };

        let asset_registry = AssetRegistry::rebuild_from_blocks(&blocks);
        let derivative_registry = DerivativeRegistry::rebuild_from_blocks(&blocks);

        let now = Utc::now();
        let fingerprint_cache =
            EntryFingerprintCache::from_entries(config.fingerprint_cache_ttl, fingerprint_entries, now);
        let rate_limiter = RateLimiter::from_history(
            config.rate_limit_max_requests,
            config.rate_limit_window,
            rate_limit_history,
            now,
        );

        Ok(Self {
            inner: RwLock::new(ChainInner {
                blocks,
                pending,
                asset_registry,
                derivative_registry,
            }),
            storage,
            llm,
            config,
            fingerprint_cache: RwLock::new(fingerprint_cache),
            rate_limiter: RwLock::new(rate_limiter),
            mine_epoch: AtomicU64::new(0),
        })
    }

    /// Submits `entry` through the full admission pipeline. On success, the
    /// entry (with its validation status and paraphrases filled in) is
    /// sitting in the pending pool, ready for the next `mine`.
    ///
    /// The chain-mutation lock is held only for the synchronous pre-gates
    /// and for the final commit; it is released for the full duration of
    /// the semantic validator's (possibly slow, retried) LLM call, so a
    /// stalled oracle never blocks other submitters or readers. Because of
    /// that gap, the tip may have advanced by the time this call wants to
    /// commit; [`Self::mine_epoch`] detects that and the submission is
    /// rejected as [`SubmitError::StateChanged`] rather than committed
    /// against assumptions (asset ownership, known parent locations) that
    /// no longer hold.
    #[instrument(skip(self, entry), fields(author = %entry.author))]
    pub async fn submit(&self, entry: Entry) -> Result<(), SubmitError> {
        let epoch_before = self.mine_epoch.load(Ordering::SeqCst);
        let now: DateTime<Utc> = Utc::now();
        let admission_config = AdmissionConfig {
            retry_policy: self.config.retry_policy.clone(),
            ..self.config.admission.clone()
        };

        let reservation = {
            let mut inner = self.inner.write().await;
            let mut cache = self.fingerprint_cache.write().await;
            let mut limiter = self.rate_limiter.write().await;
            let latest_block_timestamp = inner.blocks.last().map(|b| b.header.timestamp).unwrap_or(now);
            let mut ctx = AdmissionContext {
                fingerprint_cache: &mut cache,
                rate_limiter: &mut limiter,
                asset_registry: &mut inner.asset_registry,
                derivative_registry: &inner.derivative_registry,
                llm: self.llm.as_ref(),
                latest_block_timestamp,
            };
            admission::pre_gate(&entry, &admission_config, &mut ctx, now)?
        };

        // Lock released here. The oracle call below can take seconds and
        // retry several times; no other submitter or `mine()` call is
        // blocked on it. `pre_gate` only reads the registries and checks
        // the rate limiter/dedup cache -- it doesn't mutate either, so
        // there is nothing to roll back if the tip moves underneath us
        // while this call is in flight.
        let outcome = crate::validation::validate_entry(
            self.llm.as_ref(),
            &entry.content,
            &entry.author,
            &entry.intent,
            &admission_config.retry_policy,
        )
        .await;

        let mut inner = self.inner.write().await;
        let mut cache = self.fingerprint_cache.write().await;
        let mut limiter = self.rate_limiter.write().await;

        if self.mine_epoch.load(Ordering::SeqCst) != epoch_before {
            return Err(SubmitError::StateChanged);
        }

        if inner.pending.len() >= self.config.max_pending {
            return Err(SubmitError::Rejected(Rejection::PendingPoolFull));
        }

        // Snapshot everything `finalize` and the pending push are about to
        // mutate, so a semantic rejection partway through a gate or a save
        // failure afterward can be rolled back without leaving the asset
        // registry, dedup cache, or rate limiter in a half-committed state.
        let assets_before = inner.asset_registry.clone();
        let cache_before = cache.clone();
        let limiter_before = limiter.clone();

        let latest_block_timestamp = inner.blocks.last().map(|b| b.header.timestamp).unwrap_or(now);
        let admitted_entry = {
            let mut ctx = AdmissionContext {
                fingerprint_cache: &mut cache,
                rate_limiter: &mut limiter,
                asset_registry: &mut inner.asset_registry,
                derivative_registry: &inner.derivative_registry,
                llm: self.llm.as_ref(),
                latest_block_timestamp,
            };
            match admission::finalize(entry, reservation, outcome, &admission_config, &mut ctx, now) {
                Ok(admitted) => admitted,
                Err(rejection) => {
                    inner.asset_registry = assets_before;
                    *cache = cache_before;
                    *limiter = limiter_before;
                    return Err(SubmitError::Rejected(rejection));
                }
            }
        };

        inner.pending.push(admitted_entry);
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            genesis_text: self.config.genesis_text.clone(),
            difficulty: self.config.difficulty,
            blocks: inner.blocks.clone(),
            pending: inner.pending.clone(),
            fingerprint_cache: cache.entries(),
            rate_limit_history: limiter.history(),
            assets: AssetsSnapshot {
                owners: inner.asset_registry.owners_snapshot(),
                pending_transfers: inner.asset_registry.pending_transfers_snapshot(),
            },
            derivatives: inner
                .derivative_registry
                .edges_snapshot()
                .into_iter()
                .map(|(child, parent, rel)| DerivativeEdgeSnapshot { child, parent, rel })
                .collect(),
        };

        if let Err(e) = self.storage.save(&snapshot) {
            inner.pending.pop();
            inner.asset_registry = assets_before;
            *cache = cache_before;
            *limiter = limiter_before;
            return Err(SubmitError::Storage(e));
        }

        Ok(())
    }

    /// Mines every entry currently in the pending pool into a new block,
    /// persists the result, and atomically flips the visible tip.
    #[instrument(skip(self))]
    pub async fn mine(&self) -> Result<Block, MineError> {
        let (parent, entries) = {
            let inner = self.inner.read().await;
            if inner.pending.is_empty() && !self.config.allow_empty_blocks {
                return Err(MineError::NothingToMine);
            }
            let entries: Vec<Entry> = inner
                .pending
                .iter()
                .take(self.config.max_block_entries)
                .cloned()
                .collect();
            (inner.blocks.last().cloned().expect("genesis always present"), entries)
        };
        let mined_count = entries.len();

        let difficulty = self.config.difficulty;
        let cancel = CancellationToken::new();
        let parent_for_mining = parent.clone();
        let block = tokio::task::spawn_blocking(move || {
            miner::mine_next_block(&parent_for_mining, entries, difficulty, &cancel)
        })
        .await
        .expect("mining task panicked")?;

        let mut inner = self.inner.write().await;

        // Same rollback shape as `submit`: clone what's about to be mutated
        // so a failed `save` leaves the chain exactly as it was before this
        // call, rather than sealed in memory but unpersisted.
        let assets_before = inner.asset_registry.clone();
        let derivatives_before = inner.derivative_registry.clone();
        let blocks_before_len = inner.blocks.len();
        let pending_before = inner.pending.clone();

        for entry in &block.entries {
            if let (Some(asset_id), Some(_to)) = (entry.asset_id(), entry.asset_to()) {
                let _ = inner.asset_registry.commit_transfer(asset_id);
            } else if let Some(asset_id) = entry.asset_id() {
                inner.asset_registry.register_if_new(asset_id, &entry.author);
            }
        }
        let block_index = block.header.index;
        for (entry_index, entry) in block.entries.iter().enumerate() {
            let location = EntryLocation::new(block_index, entry_index as u32);
            inner.derivative_registry.record_sealed_entry(location, entry);
        }

        inner.blocks.push(block.clone());
        let drained = mined_count.min(inner.pending.len());
        inner.pending.drain(0..drained);

        let cache = self.fingerprint_cache.read().await;
        let limiter = self.rate_limiter.read().await;
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            genesis_text: self.config.genesis_text.clone(),
            difficulty: self.config.difficulty,
            blocks: inner.blocks.clone(),
            pending: inner.pending.clone(),
            fingerprint_cache: cache.entries(),
            rate_limit_history: limiter.history(),
            assets: AssetsSnapshot {
                owners: inner.asset_registry.owners_snapshot(),
                pending_transfers: inner.asset_registry.pending_transfers_snapshot(),
            },
            derivatives: inner
                .derivative_registry
                .edges_snapshot()
                .into_iter()
                .map(|(child, parent, rel)| DerivativeEdgeSnapshot { child, parent, rel })
                .collect(),
        };
        drop(limiter);
        drop(cache);

        if let Err(e) = self.storage.save(&snapshot) {
            inner.blocks.truncate(blocks_before_len);
            inner.pending = pending_before;
            inner.asset_registry = assets_before;
            inner.derivative_registry = derivatives_before;
            return Err(MineError::Storage(e));
        }

        drop(inner);
        self.mine_epoch.fetch_add(1, Ordering::SeqCst);

        info!(index = block.header.index, hash = %block.hash().unwrap_or_else(|_| block_hash_fallback()), "mined block");
        Ok(block)
    }

    /// A clone of the full sealed chain, oldest first.
    pub async fn read_chain(&self) -> Vec<Block> {
        self.inner.read().await.blocks.clone()
    }

    /// The most recently sealed block.
    pub async fn latest_block(&self) -> Block {
        self.inner
            .read()
            .await
            .blocks
            .last()
            .cloned()
            .expect("genesis always present")
    }

    /// Renders the sealed chain as short prose lines, one per entry:
    /// `"[{block_index}.{entry_index}] {author}: {content excerpt} ({status})"`.
    pub async fn read_narrative(&self) -> String {
        const EXCERPT_CHARS: usize = 80;
        let inner = self.inner.read().await;
        let mut lines = Vec::new();
        for (block_index, block) in inner.blocks.iter().enumerate() {
            for (entry_index, entry) in block.entries.iter().enumerate() {
                let excerpt: String = entry.content.chars().take(EXCERPT_CHARS).collect();
                let excerpt = if entry.content.chars().count() > EXCERPT_CHARS {
                    format!("{excerpt}…")
                } else {
                    excerpt
                };
                lines.push(format!(
                    "[{block_index}.{entry_index}] {}: {excerpt} ({:?})",
                    entry.author, entry.validation_status
                ));
            }
        }
        lines.join("\n")
    }

    /// Lazily finds every sealed entry authored by `author`, oldest first.
    pub async fn find_entries_by_author(&self, author: &Author) -> Vec<(EntryLocation, Entry)> {
        let inner = self.inner.read().await;
        inner
            .blocks
            .iter()
            .enumerate()
            .flat_map(|(block_index, block)| {
                block
                    .entries
                    .iter()
                    .enumerate()
                    .map(move |(entry_index, entry)| (EntryLocation::new(block_index as u64, entry_index as u32), entry.clone()))
            })
            .filter(|(_, entry)| &entry.author == author)
            .collect()
    }

    /// Recomputes every block hash and chain link, verifying the chain has
    /// not been tampered with since it was sealed.
    pub async fn validate_integrity(&self) -> Result<(), IntegrityError> {
        let inner = self.inner.read().await;
        for (i, block) in inner.blocks.iter().enumerate() {
            let recomputed_root = Block::entries_root(&block.entries).map_err(|e| IntegrityError::CorruptAt {
                index: block.header.index,
                reason: e.to_string(),
            })?;
            if recomputed_root != block.header.entries_root {
                return Err(IntegrityError::CorruptAt {
                    index: block.header.index,
                    reason: "entries_root does not match sealed entries".to_string(),
                });
            }
            if i > 0 {
                let parent = &inner.blocks[i - 1];
                let extends = block.extends(parent).map_err(|e| IntegrityError::CorruptAt {
                    index: block.header.index,
                    reason: e.to_string(),
                })?;
                if !extends {
                    return Err(IntegrityError::CorruptAt {
                        index: block.header.index,
                        reason: "does not correctly extend its parent".to_string(),
                    });
                }
            }
            if block.header.index > 0 && !block
                .hash()
                .map_err(|e| IntegrityError::CorruptAt {
                    index: block.header.index,
                    reason: e.to_string(),
                })?
                .has_leading_zero_hex_digits(self.config.difficulty)
            {
                return Err(IntegrityError::CorruptAt {
                    index: block.header.index,
                    reason: "hash does not satisfy the configured difficulty".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn block_hash_fallback() -> crate::types::BlockHash {
    crate::types::block::parent_of_genesis()
}

//! Commit orchestration.
//!
//! Applies one block's delta to a [`UtxoSet`]:
//! 1. Chain continuity check (nothing is mutated if it fails)
//! 2. Delta construction
//! 3. Per-shard apply, sequential or on a worker pool
//! 4. Tip update and optional global root recomputation

use crate::config::IngestConfig;
use crate::delta::{BlockDelta, DeltaError, DuplicateTxid, MAINNET_DUPLICATES};
use rayon::prelude::*;
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use utxoshard_core::{Block, Hash};
use utxoshard_storage::{ApplyStats, LedgerError, Shard, ShardDelta, Tip, UtxoSet};

/// Errors that can occur while committing a block.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("set is poisoned by an earlier failed commit; reload it from a checkpoint")]
    Poisoned,

    #[error("block {height}: expected height {expected}")]
    UnexpectedHeight { height: u32, expected: u32 },

    #[error("block {height}: prev blockhash {prev} does not match tip {tip}")]
    PrevHashMismatch { height: u32, prev: Hash, tip: Hash },

    #[error("first block {height} ({blockhash}) is not a genesis block")]
    NotGenesis { height: u32, blockhash: Hash },

    #[error("genesis block {found} does not match configured {expected}")]
    GenesisMismatch { expected: Hash, found: Hash },

    #[error("delta error: {0}")]
    Delta(#[from] DeltaError),

    #[error("block {height}: ledger error: {source}")]
    Ledger { height: u32, source: LedgerError },

    #[error("worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, CommitError>;

type ApplyResult = std::result::Result<ApplyStats, LedgerError>;

/// How shard deltas are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    /// A fixed pool of `workers` threads, each owning a disjoint set of shards.
    Pooled { workers: usize },
}

/// What one commit did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub height: u32,
    pub blockhash: Hash,
    pub tx_count: usize,
    pub spent_outputs: usize,
    pub created_outputs: usize,
    pub in_block_spends: usize,
    pub entries_created: usize,
    pub entries_removed: usize,
    pub shards_touched: usize,
    pub skipped_duplicates: usize,
    pub global_root: Option<Hash>,
    pub elapsed: Duration,
}

/// Split `affected` shard indices into at most `workers` disjoint groups.
///
/// Indices are dealt round-robin, so group sizes differ by at most one.
pub fn partition_shards(affected: &[u32], workers: usize) -> Vec<Vec<u32>> {
    let workers = workers.max(1).min(affected.len().max(1));
    let mut groups = vec![Vec::new(); workers];
    for (position, index) in affected.iter().enumerate() {
        groups[position % workers].push(*index);
    }
    groups.retain(|group| !group.is_empty());
    groups
}

/// Applies blocks to a set, one at a time.
pub struct Committer {
    mode: ExecutionMode,
    pool: Option<rayon::ThreadPool>,
    verify_root: bool,
    genesis_hash: Option<Hash>,
    duplicates: Vec<DuplicateTxid>,
}

impl Committer {
    pub fn sequential() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            pool: None,
            verify_root: false,
            genesis_hash: None,
            duplicates: MAINNET_DUPLICATES.to_vec(),
        }
    }

    /// A committer backed by a pool of `workers` threads.
    pub fn pooled(workers: usize) -> Result<Self> {
        if workers <= 1 {
            return Ok(Self::sequential());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("utxoshard-apply-{}", i))
            .build()?;
        Ok(Self {
            mode: ExecutionMode::Pooled { workers },
            pool: Some(pool),
            ..Self::sequential()
        })
    }

    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let committer = match config.execution_mode() {
            ExecutionMode::Sequential => Self::sequential(),
            ExecutionMode::Pooled { workers } => Self::pooled(workers)?,
        };
        Ok(committer
            .with_verify_root(config.verify_root)
            .with_genesis_hash(config.genesis_hash))
    }

    pub fn with_verify_root(mut self, verify_root: bool) -> Self {
        self.verify_root = verify_root;
        self
    }

    pub fn with_genesis_hash(mut self, genesis_hash: Option<Hash>) -> Self {
        self.genesis_hash = genesis_hash;
        self
    }

    /// Replace the table of repeated txids.
    pub fn with_duplicates(mut self, duplicates: Vec<DuplicateTxid>) -> Self {
        self.duplicates = duplicates;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn verifies_root(&self) -> bool {
        self.verify_root
    }

    /// Check that `block` extends the tip of `set`.
    ///
    /// A set without a tip only accepts a height-0 block with a zero prev
    /// blockhash, matching the configured genesis hash if there is one.
    pub fn check_continuity(&self, set: &UtxoSet, block: &Block) -> Result<()> {
        let height = block.height();
        match set.tip() {
            Some(tip) => {
                let expected = tip.height.saturating_add(1);
                if height != expected {
                    return Err(CommitError::UnexpectedHeight { height, expected });
                }
                if block.prev_blockhash() != tip.blockhash {
                    return Err(CommitError::PrevHashMismatch {
                        height,
                        prev: block.prev_blockhash(),
                        tip: tip.blockhash,
                    });
                }
            }
            None => {
                if height != 0 || block.prev_blockhash() != Hash::ZERO {
                    return Err(CommitError::NotGenesis {
                        height,
                        blockhash: block.hash(),
                    });
                }
                if let Some(expected) = self.genesis_hash {
                    if block.hash() != expected {
                        return Err(CommitError::GenesisMismatch {
                            expected,
                            found: block.hash(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Commit `block` to `set`.
    ///
    /// Continuity and delta errors leave the set untouched. A failed shard
    /// apply poisons it.
    pub fn commit(&self, set: &mut UtxoSet, block: &Block) -> Result<CommitSummary> {
        let started = Instant::now();
        if set.is_poisoned() {
            return Err(CommitError::Poisoned);
        }
        self.check_continuity(set, block)?;

        let delta =
            BlockDelta::build_with_duplicates(block, set.shard_count(), &self.duplicates)?;
        let height = delta.height();

        let stats = match self.apply(set, &delta) {
            Ok(stats) => stats,
            Err(source) => {
                set.poison();
                tracing::error!(height, error = %source, "shard apply failed; set poisoned");
                return Err(CommitError::Ledger { height, source });
            }
        };

        set.set_tip(Tip {
            height,
            blockhash: delta.blockhash(),
        });

        let global_root = if self.verify_root {
            match set.compute_global_root() {
                Ok(root) => {
                    set.set_global_root(Some(root));
                    Some(root)
                }
                Err(source) => {
                    set.poison();
                    return Err(CommitError::Ledger { height, source });
                }
            }
        } else {
            // A root tracked from an earlier block no longer matches.
            set.set_global_root(None);
            None
        };

        Ok(CommitSummary {
            height,
            blockhash: delta.blockhash(),
            tx_count: delta.tx_count(),
            spent_outputs: delta.spent_outputs(),
            created_outputs: delta.created_outputs(),
            in_block_spends: delta.in_block_spends(),
            entries_created: stats.entries_created,
            entries_removed: stats.entries_removed,
            shards_touched: delta.shards().len(),
            skipped_duplicates: delta.skipped_duplicates().len(),
            global_root,
            elapsed: started.elapsed(),
        })
    }

    fn apply(&self, set: &mut UtxoSet, delta: &BlockDelta) -> ApplyResult {
        match (&self.pool, self.mode) {
            (Some(pool), ExecutionMode::Pooled { workers }) => {
                apply_pooled(pool, workers, set, delta)
            }
            _ => apply_sequential(set, delta),
        }
    }
}

impl Default for Committer {
    fn default() -> Self {
        Self::sequential()
    }
}

fn apply_sequential(set: &mut UtxoSet, delta: &BlockDelta) -> ApplyResult {
    let shards = set.shards_mut();
    let mut stats = ApplyStats::default();
    for (index, shard_delta) in delta.shards() {
        stats += shards[*index as usize].apply(shard_delta)?;
    }
    Ok(stats)
}

fn apply_pooled(
    pool: &rayon::ThreadPool,
    workers: usize,
    set: &mut UtxoSet,
    delta: &BlockDelta,
) -> ApplyResult {
    let groups = partition_shards(&delta.affected_shards(), workers);

    // Owning group of each shard index.
    let mut owner: Vec<Option<usize>> = vec![None; set.shard_count().get() as usize];
    for (group, indices) in groups.iter().enumerate() {
        for index in indices {
            owner[*index as usize] = Some(group);
        }
    }

    let mut jobs: Vec<Vec<(&mut Box<dyn Shard>, &ShardDelta)>> =
        groups.iter().map(|_| Vec::new()).collect();
    for (index, shard) in set.shards_mut().iter_mut().enumerate() {
        if let (Some(group), Some(shard_delta)) = (owner[index], delta.shard(index as u32)) {
            jobs[group].push((shard, shard_delta));
        }
    }

    let per_worker = pool.install(|| {
        jobs.into_par_iter()
            .map(|job| -> ApplyResult {
                let mut stats = ApplyStats::default();
                for (shard, shard_delta) in job {
                    stats += shard.apply(shard_delta)?;
                }
                Ok(stats)
            })
            .collect::<std::result::Result<Vec<ApplyStats>, LedgerError>>()
    })?;

    let mut stats = ApplyStats::default();
    for worker in per_worker {
        stats += worker;
    }
    Ok(stats)
}

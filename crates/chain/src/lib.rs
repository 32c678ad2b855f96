//! Block ingestion for utxoshard.
//!
//! This crate turns a stream of blocks into commits against a sharded UTXO set:
//! - **Delta**: per-block spends and new entries, partitioned by shard
//! - **Commit**: continuity checks and sequential or pooled shard apply
//! - **Source**: block sources (in-memory, directory of raw blocks)
//! - **Sequencer**: the one-block-at-a-time driver with checkpointing
//!
//! # Example
//!
//! ```rust,no_run
//! use utxoshard_chain::{DirSource, IngestConfig, Sequencer};
//! use utxoshard_storage::{MapShardFactory, SledPersistence, Storage, UtxoSet};
//!
//! let config = IngestConfig {
//!     workers: 4,
//!     checkpoint_every: 1000,
//!     ..IngestConfig::default()
//! };
//! let set = UtxoSet::new(config.shard_count, &MapShardFactory).unwrap();
//! let storage = Storage::open("./utxo_data").unwrap();
//!
//! let sequencer = Sequencer::from_config(DirSource::new("./blocks", 0), set, &config)
//!     .unwrap()
//!     .with_persistence(Box::new(SledPersistence::new(storage)));
//! let report = sequencer.run().unwrap();
//! println!("{} blocks committed", report.blocks);
//! ```

pub mod commit;
pub mod config;
pub mod delta;
pub mod sequencer;
pub mod source;

// Re-export commonly used types
pub use commit::{partition_shards, CommitError, CommitSummary, Committer, ExecutionMode};
pub use config::IngestConfig;
pub use delta::{is_ignored_duplicate, BlockDelta, DeltaError, DuplicateTxid, MAINNET_DUPLICATES};
pub use sequencer::{
    CloseHandle, Cycle, LatestBlock, RunReport, Sequencer, SequencerError, SequencerState,
    StopReason,
};
pub use source::{parse_blockhash, BlockSource, DirSource, MemorySource, SourceError};

//! Sharded UTXO ledger and persistent storage for utxoshard.
//!
//! This crate provides the ledger the commit orchestrator mutates:
//! - Deterministic sharding of txids
//! - Ledger entries (UTX) and spend records (STX)
//! - Shards and the whole-set view with its global root
//! - sled-backed checkpoints
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Commit Orchestrator                   │
//! │             (BlockDelta, Committer, Sequencer)           │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                     Ledger Layer                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │  UtxoSet    │  │  Shard      │  │ ShardPersistence│  │
//! │  │  - shards   │  │  - Utx map  │  │  - sled wrapper │  │
//! │  │  - tip      │  │  - sizes    │  │  - storage form │  │
//! │  │  - root     │  │  - hash     │  │  - set metadata │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────┘  │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                    sled Database                         │
//! │              (Embedded Key-Value Store)                  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use utxoshard_storage::{
//!     MapShardFactory, ShardCount, ShardPersistence, SledPersistence, Storage, UtxoSet,
//! };
//!
//! let storage = Storage::open("./utxo_data").unwrap();
//! let persistence = SledPersistence::new(storage);
//!
//! let set = match persistence.load_set(&MapShardFactory).unwrap() {
//!     Some(set) => set,
//!     None => UtxoSet::new(ShardCount::new(16).unwrap(), &MapShardFactory).unwrap(),
//! };
//! println!("{} entries", set.totals().entries);
//! ```

pub mod db;
pub mod error;
pub mod persist;
pub mod shard;
pub mod sharding;
pub mod utx;
pub mod utxo_set;

// Re-export commonly used types
pub use db::{BatchOp, Result, Storage, StorageError};
pub use error::LedgerError;
pub use persist::{SetMeta, ShardPersistence, SledPersistence};
pub use shard::{
    decode_shard, header_size, ApplyStats, MapShard, MapShardFactory, Shard, ShardDelta,
    ShardFactory, ShardForm,
};
pub use sharding::{resharding_sources, shard_index, txid_prefix, ShardCount, ShardingError};
pub use utx::{Spent, Stx, Utx};
pub use utxo_set::{SetTotals, Tip, UtxoSet};

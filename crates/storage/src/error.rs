//! Ledger consistency errors.

use crate::sharding::ShardingError;
use thiserror::Error;
use utxoshard_core::{DecodeError, Hash};

/// Errors raised while mutating, hashing or decoding shards and entries.
///
/// A shard whose `apply` returned one of these is in an undefined state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("shard {shard}: entry {txid} not found")]
    EntryNotFound { shard: u32, txid: Hash },

    #[error("output {txid}:{index} not found")]
    OutputNotFound { txid: Hash, index: u32 },

    #[error("entry {txid} belongs to shard {expected}, not shard {shard}")]
    WrongShard { txid: Hash, expected: u32, shard: u32 },

    #[error("shard {shard}: entry {txid} already exists")]
    DuplicateEntry { shard: u32, txid: Hash },

    #[error("entry {txid} has no unspent outputs")]
    EmptyEntry { txid: Hash },

    #[error("shard {shard}: serialized size drift (tracked {tracked} bytes, actual {actual})")]
    SizeDrift {
        shard: u32,
        tracked: usize,
        actual: usize,
    },

    #[error("shard layout mismatch (expected {expected} shards, found {found})")]
    ShardCountMismatch { expected: u32, found: u32 },

    #[error("shard slot {slot} holds shard {found}")]
    MisplacedShard { slot: u32, found: u32 },

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("sharding error: {0}")]
    Sharding(#[from] ShardingError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

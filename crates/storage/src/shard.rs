//! Shards: ordered collections of ledger entries for one txid range.
//!
//! [`Shard`] is the interface the rest of the ledger works against. The
//! sorted-map backed [`MapShard`] is the implementation; a [`ShardFactory`]
//! value decides which implementation a [`crate::UtxoSet`] is built from.
//!
//! Both serializations share the header
//! `shardCount(4) | shardIndex(4) | entryCount(compact)` followed by the
//! entries in txid order, each in protocol or storage form.

use crate::error::{LedgerError, Result};
use crate::sharding::{shard_index, ShardCount};
use crate::utx::{Spent, Stx, Utx};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;
use utxoshard_core::{compact_size_len, hash, write_compact_size, DecodeError, Hash, Reader, TxOut};

/// Size of the serialization header for `entry_count` entries.
pub fn header_size(entry_count: usize) -> usize {
    4 + 4 + compact_size_len(entry_count as u64)
}

/// One block's changes for one shard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardDelta {
    /// Outputs to remove, grouped by the transaction that created them.
    pub spends: Vec<Stx>,
    /// New entries to insert.
    pub creates: Vec<Utx>,
}

impl ShardDelta {
    pub fn is_empty(&self) -> bool {
        self.spends.is_empty() && self.creates.is_empty()
    }

    pub fn spent_outputs(&self) -> usize {
        self.spends.iter().map(Stx::len).sum()
    }

    pub fn created_outputs(&self) -> usize {
        self.creates.iter().map(Utx::len).sum()
    }
}

/// Counters produced by [`Shard::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub outputs_spent: usize,
    pub entries_removed: usize,
    pub entries_created: usize,
    pub outputs_created: usize,
}

impl AddAssign for ApplyStats {
    fn add_assign(&mut self, other: Self) {
        self.outputs_spent += other.outputs_spent;
        self.entries_removed += other.entries_removed;
        self.entries_created += other.entries_created;
        self.outputs_created += other.outputs_created;
    }
}

/// A mutable container for the ledger entries of one shard.
///
/// Implementations keep entries sorted by txid and track their serialized
/// sizes incrementally.
pub trait Shard: Send + Sync + fmt::Debug {
    fn index(&self) -> u32;

    /// Shard count this shard was created for.
    fn shard_count(&self) -> ShardCount;

    fn entry_count(&self) -> usize;

    /// Number of unspent outputs across all entries.
    fn output_count(&self) -> usize;

    /// Protocol serialization size, header included, from running totals.
    fn protocol_size(&self) -> usize;

    /// Storage serialization size, header included, from running totals.
    fn storage_size(&self) -> usize;

    fn get(&self, txid: &Hash) -> Option<&Utx>;

    /// Entries in txid order.
    fn entries(&self) -> Box<dyn Iterator<Item = &Utx> + '_>;

    /// Insert a new, non-empty entry owned by this shard.
    fn insert(&mut self, entry: Utx) -> Result<()>;

    /// Spend one output, removing the entry once it is empty.
    fn spend(&mut self, txid: &Hash, index: u32) -> Result<Spent>;

    fn output(&self, txid: &Hash, index: u32) -> Option<&TxOut> {
        self.get(txid).and_then(|entry| entry.output(index))
    }

    fn contains(&self, txid: &Hash, index: u32) -> bool {
        self.output(txid, index).is_some()
    }

    fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    /// Apply one block's changes: every spend first, then every insert.
    ///
    /// On error the shard is left in an undefined state and must be
    /// discarded.
    fn apply(&mut self, delta: &ShardDelta) -> Result<ApplyStats> {
        let mut stats = ApplyStats::default();
        for stx in &delta.spends {
            for index in stx.indices() {
                if self.spend(&stx.txid(), index)?.is_emptied() {
                    stats.entries_removed += 1;
                }
                stats.outputs_spent += 1;
            }
        }
        for entry in &delta.creates {
            stats.outputs_created += entry.len();
            self.insert(entry.clone())?;
            stats.entries_created += 1;
        }
        tracing::trace!(
            shard = self.index(),
            spent = stats.outputs_spent,
            created = stats.outputs_created,
            "shard delta applied"
        );
        Ok(stats)
    }

    fn encode_protocol(&self, out: &mut Vec<u8>) {
        write_header(self, out);
        for entry in self.entries() {
            entry.encode_protocol(out);
        }
    }

    fn encode_storage(&self, out: &mut Vec<u8>) {
        write_header(self, out);
        for entry in self.entries() {
            entry.encode_storage(out);
        }
    }

    fn to_protocol_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.protocol_size());
        self.encode_protocol(&mut out);
        out
    }

    fn to_storage_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.storage_size());
        self.encode_storage(&mut out);
        out
    }

    /// Double hash of the protocol serialization.
    ///
    /// Always recomputed. Fails if the serialized length disagrees with the
    /// tracked size.
    fn hash(&self) -> Result<Hash> {
        let bytes = self.to_protocol_bytes();
        if bytes.len() != self.protocol_size() {
            return Err(LedgerError::SizeDrift {
                shard: self.index(),
                tracked: self.protocol_size(),
                actual: bytes.len(),
            });
        }
        Ok(hash(&bytes))
    }
}

fn write_header<S: Shard + ?Sized>(shard: &S, out: &mut Vec<u8>) {
    out.extend_from_slice(&shard.shard_count().get().to_le_bytes());
    out.extend_from_slice(&shard.index().to_le_bytes());
    write_compact_size(out, shard.entry_count() as u64);
}

/// Creates empty shards of one implementation.
pub trait ShardFactory: Send + Sync {
    fn create(&self, count: ShardCount, index: u32) -> Result<Box<dyn Shard>>;
}

/// Serialization layout of a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardForm {
    Protocol,
    Storage,
}

/// Decode a whole shard from `bytes` into a shard built by `factory`.
pub fn decode_shard(
    factory: &dyn ShardFactory,
    bytes: &[u8],
    form: ShardForm,
) -> Result<Box<dyn Shard>> {
    let mut reader = Reader::new(bytes);
    let count = ShardCount::new(reader.read_u32_le()?)?;
    let index = reader.read_u32_le()?;
    count.check_index(index)?;
    let entries = reader.read_len()?;

    let mut shard = factory.create(count, index)?;
    let mut previous: Option<Hash> = None;
    for _ in 0..entries {
        let offset = reader.position();
        let entry = match form {
            ShardForm::Protocol => Utx::decode_protocol(&mut reader)?,
            ShardForm::Storage => Utx::decode_storage(&mut reader)?,
        };
        if previous.is_some_and(|previous| entry.txid() <= previous) {
            return Err(DecodeError::Invalid {
                offset,
                reason: "shard entries not in ascending txid order",
            }
            .into());
        }
        previous = Some(entry.txid());
        shard.insert(entry)?;
    }
    reader.finish()?;
    Ok(shard)
}

/// A shard backed by a `BTreeMap` keyed by txid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapShard {
    count: ShardCount,
    index: u32,
    entries: BTreeMap<Hash, Utx>,
    outputs: usize,
    /// Serialized bytes of the entries (header excluded).
    protocol_bytes: usize,
    storage_bytes: usize,
}

impl MapShard {
    pub fn new(count: ShardCount, index: u32) -> Result<Self> {
        count.check_index(index)?;
        Ok(Self {
            count,
            index,
            entries: BTreeMap::new(),
            outputs: 0,
            protocol_bytes: 0,
            storage_bytes: 0,
        })
    }
}

impl Shard for MapShard {
    fn index(&self) -> u32 {
        self.index
    }

    fn shard_count(&self) -> ShardCount {
        self.count
    }

    fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn output_count(&self) -> usize {
        self.outputs
    }

    fn protocol_size(&self) -> usize {
        header_size(self.entries.len()) + self.protocol_bytes
    }

    fn storage_size(&self) -> usize {
        header_size(self.entries.len()) + self.storage_bytes
    }

    fn get(&self, txid: &Hash) -> Option<&Utx> {
        self.entries.get(txid)
    }

    fn entries(&self) -> Box<dyn Iterator<Item = &Utx> + '_> {
        Box::new(self.entries.values())
    }

    fn insert(&mut self, entry: Utx) -> Result<()> {
        let txid = entry.txid();
        if entry.is_empty() {
            return Err(LedgerError::EmptyEntry { txid });
        }
        let expected = shard_index(self.count, &txid);
        if expected != self.index {
            return Err(LedgerError::WrongShard {
                txid,
                expected,
                shard: self.index,
            });
        }
        if self.entries.contains_key(&txid) {
            return Err(LedgerError::DuplicateEntry {
                shard: self.index,
                txid,
            });
        }

        self.outputs += entry.len();
        self.protocol_bytes += entry.protocol_size();
        self.storage_bytes += entry.storage_size();
        self.entries.insert(txid, entry);
        Ok(())
    }

    fn spend(&mut self, txid: &Hash, index: u32) -> Result<Spent> {
        let entry = self
            .entries
            .get_mut(txid)
            .ok_or(LedgerError::EntryNotFound {
                shard: self.index,
                txid: *txid,
            })?;

        let protocol_before = entry.protocol_size();
        let storage_before = entry.storage_size();
        let spent = entry.spend(index)?;
        self.outputs -= 1;

        if spent.is_emptied() {
            self.entries.remove(txid);
            self.protocol_bytes -= protocol_before;
            self.storage_bytes -= storage_before;
        } else {
            self.protocol_bytes -= protocol_before - entry.protocol_size();
            self.storage_bytes -= storage_before - entry.storage_size();
        }
        Ok(spent)
    }
}

/// Factory for [`MapShard`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MapShardFactory;

impl ShardFactory for MapShardFactory {
    fn create(&self, count: ShardCount, index: u32) -> Result<Box<dyn Shard>> {
        Ok(Box::new(MapShard::new(count, index)?))
    }
}

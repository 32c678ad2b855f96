//! The complete sharded UTXO set.

use crate::error::{LedgerError, Result};
use crate::shard::{Shard, ShardFactory};
use crate::sharding::{resharding_sources, shard_index, ShardCount};
use crate::utx::Utx;
use serde::{Deserialize, Serialize};
use std::fmt;
use utxoshard_core::{merkle_root, Hash, MerkleTree, TxOut};

/// The last block committed to a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tip {
    pub height: u32,
    pub blockhash: Hash,
}

/// Aggregate counters over every shard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTotals {
    pub entries: u64,
    pub outputs: u64,
    pub protocol_bytes: u64,
    pub storage_bytes: u64,
}

/// Every shard for one shard count, plus the chain tip they reflect.
///
/// Shards are held in index order: `shards[i].index() == i`.
pub struct UtxoSet {
    count: ShardCount,
    shards: Vec<Box<dyn Shard>>,
    tip: Option<Tip>,
    global_root: Option<Hash>,
    poisoned: bool,
}

impl UtxoSet {
    /// An empty set with `count` shards created by `factory`.
    pub fn new(count: ShardCount, factory: &dyn ShardFactory) -> Result<Self> {
        let shards = count
            .indices()
            .map(|index| factory.create(count, index))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            count,
            shards,
            tip: None,
            global_root: None,
            poisoned: false,
        })
    }

    /// Assemble a set from previously loaded shards.
    pub fn from_shards(
        count: ShardCount,
        shards: Vec<Box<dyn Shard>>,
        tip: Option<Tip>,
        global_root: Option<Hash>,
    ) -> Result<Self> {
        if shards.len() != count.get() as usize {
            return Err(LedgerError::ShardCountMismatch {
                expected: count.get(),
                found: shards.len() as u32,
            });
        }
        for (slot, shard) in shards.iter().enumerate() {
            if shard.shard_count() != count {
                return Err(LedgerError::ShardCountMismatch {
                    expected: count.get(),
                    found: shard.shard_count().get(),
                });
            }
            if shard.index() != slot as u32 {
                return Err(LedgerError::MisplacedShard {
                    slot: slot as u32,
                    found: shard.index(),
                });
            }
        }
        Ok(Self {
            count,
            shards,
            tip,
            global_root,
            poisoned: false,
        })
    }

    pub fn shard_count(&self) -> ShardCount {
        self.count
    }

    pub fn shard(&self, index: u32) -> Option<&dyn Shard> {
        self.shards.get(index as usize).map(|shard| shard.as_ref())
    }

    pub fn shards(&self) -> impl Iterator<Item = &dyn Shard> {
        self.shards.iter().map(|shard| shard.as_ref())
    }

    /// Mutable access to every shard, in index order.
    pub fn shards_mut(&mut self) -> &mut [Box<dyn Shard>] {
        &mut self.shards
    }

    /// The shard that owns `txid`.
    pub fn shard_for(&self, txid: &Hash) -> &dyn Shard {
        self.shards[shard_index(self.count, txid) as usize].as_ref()
    }

    pub fn get(&self, txid: &Hash) -> Option<&Utx> {
        self.shard_for(txid).get(txid)
    }

    pub fn output(&self, txid: &Hash, index: u32) -> Option<&TxOut> {
        self.shard_for(txid).output(txid, index)
    }

    pub fn tip(&self) -> Option<Tip> {
        self.tip
    }

    pub fn set_tip(&mut self, tip: Tip) {
        self.tip = Some(tip);
    }

    pub fn best_height(&self) -> Option<u32> {
        self.tip.map(|tip| tip.height)
    }

    pub fn best_blockhash(&self) -> Option<Hash> {
        self.tip.map(|tip| tip.blockhash)
    }

    /// Hash of every shard, in index order.
    pub fn shard_hashes(&self) -> Result<Vec<Hash>> {
        self.shards.iter().map(|shard| shard.hash()).collect()
    }

    /// Merkle root over the shard hashes.
    pub fn compute_global_root(&self) -> Result<Hash> {
        Ok(merkle_root(&self.shard_hashes()?))
    }

    /// Full merkle tree over the shard hashes.
    pub fn shard_tree(&self) -> Result<MerkleTree> {
        Ok(MerkleTree::new(&self.shard_hashes()?))
    }

    /// The last recorded global root, if root tracking is enabled.
    pub fn global_root(&self) -> Option<Hash> {
        self.global_root
    }

    pub fn set_global_root(&mut self, root: Option<Hash>) {
        self.global_root = root;
    }

    pub fn totals(&self) -> SetTotals {
        self.shards.iter().fold(SetTotals::default(), |mut totals, shard| {
            totals.entries += shard.entry_count() as u64;
            totals.outputs += shard.output_count() as u64;
            totals.protocol_bytes += shard.protocol_size() as u64;
            totals.storage_bytes += shard.storage_size() as u64;
            totals
        })
    }

    /// Mark the set as unusable after a failed mutation.
    pub fn poison(&mut self) {
        self.poisoned = true;
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Copy every entry into a new set with `new_count` shards.
    ///
    /// The tip is carried over; the global root is recomputed if this set
    /// tracks one.
    pub fn reshard(&self, new_count: ShardCount, factory: &dyn ShardFactory) -> Result<Self> {
        let mut shards = Vec::with_capacity(new_count.get() as usize);
        for index in new_count.indices() {
            let mut shard = factory.create(new_count, index)?;
            for source in resharding_sources(self.count, new_count, index)? {
                for entry in self.shards[source as usize].entries() {
                    if shard_index(new_count, &entry.txid()) == index {
                        shard.insert(entry.clone())?;
                    }
                }
            }
            shards.push(shard);
        }

        let mut set = Self::from_shards(new_count, shards, self.tip, None)?;
        if self.global_root.is_some() {
            set.global_root = Some(set.compute_global_root()?);
        }
        tracing::debug!(
            from = %self.count,
            to = %new_count,
            entries = set.totals().entries,
            "set resharded"
        );
        Ok(set)
    }
}

impl fmt::Debug for UtxoSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UtxoSet")
            .field("count", &self.count)
            .field("tip", &self.tip)
            .field("global_root", &self.global_root)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

//! Loading and storing shards and set metadata.

use crate::db::{BatchOp, Result, Storage, StorageError};
use crate::error::LedgerError;
use crate::shard::{decode_shard, Shard, ShardFactory, ShardForm};
use crate::sharding::ShardCount;
use crate::utxo_set::{Tip, UtxoSet};
use serde::{Deserialize, Serialize};
use utxoshard_core::Hash;

const META_KEY: &str = "set";

/// Everything about a stored set except its shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetMeta {
    pub shard_count: ShardCount,
    pub tip: Option<Tip>,
    pub global_root: Option<Hash>,
}

impl SetMeta {
    pub fn of(set: &UtxoSet) -> Self {
        Self {
            shard_count: set.shard_count(),
            tip: set.tip(),
            global_root: set.global_root(),
        }
    }
}

/// A place shards can be checkpointed to and restored from.
pub trait ShardPersistence: Send + Sync {
    /// Load shard `index` of `count`, or `None` if it was never stored.
    fn load_shard(
        &self,
        factory: &dyn ShardFactory,
        count: ShardCount,
        index: u32,
    ) -> Result<Option<Box<dyn Shard>>>;

    fn store_shard(&self, shard: &dyn Shard) -> Result<()>;

    fn load_meta(&self) -> Result<Option<SetMeta>>;

    fn store_meta(&self, meta: &SetMeta) -> Result<()>;

    /// Store every shard, then the metadata.
    fn save_set(&self, set: &UtxoSet) -> Result<()> {
        for shard in set.shards() {
            self.store_shard(shard)?;
        }
        self.store_meta(&SetMeta::of(set))
    }

    /// Restore a whole set, checking the stored global root if there is one.
    fn load_set(&self, factory: &dyn ShardFactory) -> Result<Option<UtxoSet>> {
        let meta = match self.load_meta()? {
            Some(meta) => meta,
            None => return Ok(None),
        };
        let count = meta.shard_count;
        let mut shards = Vec::with_capacity(count.get() as usize);
        for index in count.indices() {
            let shard = self.load_shard(factory, count, index)?.ok_or_else(|| {
                StorageError::NotFound(format!("shard {} of {}", index, count))
            })?;
            shards.push(shard);
        }

        let set = UtxoSet::from_shards(count, shards, meta.tip, meta.global_root)?;
        if let Some(stored) = meta.global_root {
            let computed = set.compute_global_root()?;
            if computed != stored {
                return Err(StorageError::RootMismatch { stored, computed });
            }
        }
        Ok(Some(set))
    }
}

/// Persists shards in storage form in a sled database.
#[derive(Clone)]
pub struct SledPersistence {
    storage: Storage,
}

impl SledPersistence {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}

impl ShardPersistence for SledPersistence {
    fn load_shard(
        &self,
        factory: &dyn ShardFactory,
        count: ShardCount,
        index: u32,
    ) -> Result<Option<Box<dyn Shard>>> {
        match self.storage.get_raw(Storage::shard_key(count.get(), index))? {
            Some(bytes) => {
                let shard = decode_shard(factory, &bytes, ShardForm::Storage)?;
                if shard.index() != index || shard.shard_count() != count {
                    return Err(LedgerError::MisplacedShard {
                        slot: index,
                        found: shard.index(),
                    }
                    .into());
                }
                Ok(Some(shard))
            }
            None => Ok(None),
        }
    }

    fn store_shard(&self, shard: &dyn Shard) -> Result<()> {
        let key = Storage::shard_key(shard.shard_count().get(), shard.index());
        self.storage.put_raw(key, &shard.to_storage_bytes())
    }

    fn load_meta(&self) -> Result<Option<SetMeta>> {
        self.storage.get(Storage::meta_key(META_KEY))
    }

    fn store_meta(&self, meta: &SetMeta) -> Result<()> {
        self.storage.put(Storage::meta_key(META_KEY), meta)
    }

    /// Write the whole set in one atomic batch, dropping shards stored under
    /// any other shard count.
    fn save_set(&self, set: &UtxoSet) -> Result<()> {
        let current = Storage::shard_count_prefix(set.shard_count().get());
        let mut ops: Vec<BatchOp> = self
            .storage
            .keys_with_prefix(Storage::SHARD_PREFIX)?
            .into_iter()
            .filter(|key| !key.starts_with(&current))
            .map(|key| BatchOp::Remove { key })
            .collect();
        let stale = ops.len();

        for shard in set.shards() {
            ops.push(BatchOp::Insert {
                key: Storage::shard_key(shard.shard_count().get(), shard.index()),
                value: shard.to_storage_bytes(),
            });
        }
        ops.push(BatchOp::Insert {
            key: Storage::meta_key(META_KEY),
            value: bincode::serialize(&SetMeta::of(set))?,
        });

        self.storage.batch(ops)?;
        self.storage.flush()?;
        tracing::debug!(
            shards = %set.shard_count(),
            height = ?set.best_height(),
            stale,
            "set checkpointed"
        );
        Ok(())
    }
}

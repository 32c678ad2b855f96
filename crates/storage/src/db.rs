//! sled database wrapper with serialization helpers.

use crate::error::LedgerError;
use sled::Db;
use std::path::Path;
use thiserror::Error;
use utxoshard_core::Hash;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Missing record: {0}")]
    NotFound(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Global root mismatch: stored {stored}, computed {computed}")]
    RootMismatch { stored: Hash, computed: Hash },
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Handle to the sled database holding shards and set metadata.
///
/// Clones share the same database.
#[derive(Clone)]
pub struct Storage {
    db: Db,
}

impl Storage {
    /// Open a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// A throwaway database removed on drop.
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Store a value in bincode form.
    pub fn put<K, V>(&self, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: serde::Serialize,
    {
        let encoded = bincode::serialize(value)?;
        self.db.insert(key, encoded)?;
        Ok(())
    }

    pub fn get<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: serde::de::DeserializeOwned,
    {
        match self.db.get(key)? {
            Some(bytes) => {
                let value = bincode::deserialize(&bytes)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Store bytes that are already serialized.
    pub fn put_raw<K: AsRef<[u8]>>(&self, key: K, bytes: &[u8]) -> Result<()> {
        self.db.insert(key, bytes)?;
        Ok(())
    }

    pub fn get_raw<K: AsRef<[u8]>>(&self, key: K) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|bytes| bytes.to_vec()))
    }

    /// Delete a key.
    pub fn delete<K: AsRef<[u8]>>(&self, key: K) -> Result<()> {
        self.db.remove(key)?;
        Ok(())
    }

    /// Every key starting with `prefix`, in key order.
    pub fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.db
            .scan_prefix(prefix)
            .keys()
            .map(|key| Ok(key?.to_vec()))
            .collect()
    }

    /// Write every operation in one sled batch; either all land or none.
    pub fn batch(&self, operations: Vec<BatchOp>) -> Result<()> {
        let mut batch = sled::Batch::default();
        for op in operations {
            match op {
                BatchOp::Insert { key, value } => batch.insert(key, value),
                BatchOp::Remove { key } => batch.remove(key),
            }
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Prefix shared by every shard key.
    pub const SHARD_PREFIX: &'static [u8] = b"shard:";

    /// Key of one shard.
    /// Format: "shard:" + count (4 BE) + index (4 BE)
    pub fn shard_key(count: u32, index: u32) -> Vec<u8> {
        let mut key = Self::shard_count_prefix(count);
        key.extend_from_slice(&index.to_be_bytes());
        key
    }

    /// Prefix of every shard key for one shard count.
    pub fn shard_count_prefix(count: u32) -> Vec<u8> {
        let mut key = Self::SHARD_PREFIX.to_vec();
        key.extend_from_slice(&count.to_be_bytes());
        key
    }

    /// Key of a set metadata field.
    /// Format: "meta:{name}"
    pub fn meta_key(name: &str) -> Vec<u8> {
        format!("meta:{}", name).into_bytes()
    }
}

/// One write inside [`Storage::batch`].
pub enum BatchOp {
    Insert { key: Vec<u8>, value: Vec<u8> },
    Remove { key: Vec<u8> },
}

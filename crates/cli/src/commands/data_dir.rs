//! Layout of a data directory: `config.json` plus a sled database.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use utxoshard_core::Hash;
use utxoshard_storage::{
    MapShardFactory, ShardCount, ShardPersistence, SledPersistence, Storage, UtxoSet,
};

/// Settings fixed when a data directory is first used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirConfig {
    pub shard_count: ShardCount,
    /// Display-order hex of the required genesis blockhash.
    pub genesis_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DirConfig {
    pub fn new(shard_count: ShardCount, genesis_hash: Option<Hash>) -> Self {
        let now = Utc::now();
        Self {
            shard_count,
            genesis_hash: genesis_hash.map(|hash| hash.to_hex()),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn genesis(&self) -> Result<Option<Hash>> {
        self.genesis_hash.as_deref().map(parse_hash).transpose()
    }
}

pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn load_config(&self) -> Result<Option<DirConfig>> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(Some(config))
    }

    pub fn save_config(&self, config: &DirConfig) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create data directory: {:?}", self.root))?;
        fs::write(self.config_path(), serde_json::to_string_pretty(config)?)?;
        Ok(())
    }

    pub fn open_storage(&self) -> Result<Storage> {
        Storage::open(self.root.join("db")).with_context(|| "Failed to open storage")
    }

    /// Config, persistence and set of a directory that was ingested before.
    pub fn open_existing(&self) -> Result<(DirConfig, SledPersistence, UtxoSet)> {
        let config = match self.load_config()? {
            Some(config) => config,
            None => bail!(
                "No UTXO set in {}. Did you run 'utxoshard ingest'?",
                self.root.display()
            ),
        };
        let persistence = SledPersistence::new(self.open_storage()?);
        let set = persistence
            .load_set(&MapShardFactory)
            .with_context(|| "Failed to load UTXO set")?
            .with_context(|| "Data directory has a config but no stored set")?;
        if set.shard_count() != config.shard_count {
            bail!(
                "Stored set has {} shards but config.json says {}",
                set.shard_count(),
                config.shard_count
            );
        }
        Ok((config, persistence, set))
    }
}

pub fn parse_hash(text: &str) -> Result<Hash> {
    utxoshard_chain::parse_blockhash(text).with_context(|| format!("Invalid hash: {}", text))
}

pub fn parse_shard_count(count: u32) -> Result<ShardCount> {
    ShardCount::new(count).with_context(|| format!("Invalid shard count: {}", count))
}

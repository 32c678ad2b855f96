//! Ingestion configuration.

use crate::commit::ExecutionMode;
use serde::{Deserialize, Serialize};
use utxoshard_core::Hash;
use utxoshard_storage::ShardCount;

/// Settings for one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Shard count of a new set. An existing set keeps its own.
    pub shard_count: ShardCount,
    /// Apply workers; 0 or 1 applies shards sequentially.
    pub workers: usize,
    /// Recompute the global root after every commit.
    pub verify_root: bool,
    /// Required hash of the block at height 0.
    pub genesis_hash: Option<Hash>,
    /// Checkpoint after this many blocks; 0 only checkpoints at the end.
    pub checkpoint_every: u32,
    /// Log a progress line every this many blocks; 0 disables it.
    pub progress_every: u32,
}

impl IngestConfig {
    pub fn execution_mode(&self) -> ExecutionMode {
        if self.workers <= 1 {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Pooled {
                workers: self.workers,
            }
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            shard_count: ShardCount::DEFAULT,
            workers: 0,
            verify_root: false,
            genesis_hash: None,
            checkpoint_every: 0,
            progress_every: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_mode() {
        let mut config = IngestConfig::default();
        assert_eq!(config.execution_mode(), ExecutionMode::Sequential);
        config.workers = 1;
        assert_eq!(config.execution_mode(), ExecutionMode::Sequential);
        config.workers = 4;
        assert_eq!(config.execution_mode(), ExecutionMode::Pooled { workers: 4 });
    }
}

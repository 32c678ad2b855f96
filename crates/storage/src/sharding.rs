//! Deterministic partitioning of txids into shards.
//!
//! A txid's shard is given by the top bits of its first four display-order
//! bytes read as a big-endian integer. Because the shard index is a prefix,
//! doubling the shard count splits every shard into two adjacent ones.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use thiserror::Error;
use utxoshard_core::Hash;

/// Configuration errors for shard counts and indices.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShardingError {
    #[error("shard count {0} is not a power of two in [1, 2^30]")]
    InvalidShardCount(u64),

    #[error("shard index {index} out of range for {count} shards")]
    IndexOutOfRange { index: u32, count: u32 },
}

/// A validated shard count: a power of two in `[1, 2^30]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ShardCount(u32);

impl ShardCount {
    /// Largest supported shard count.
    pub const MAX: u32 = 1 << 30;

    /// A single shard holding every entry.
    pub const ONE: Self = Self(1);

    /// Shard count used for new sets unless configured otherwise.
    pub const DEFAULT: Self = Self(16);

    pub fn new(count: u32) -> Result<Self, ShardingError> {
        if count == 0 || !count.is_power_of_two() || count > Self::MAX {
            return Err(ShardingError::InvalidShardCount(u64::from(count)));
        }
        Ok(Self(count))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// `log2` of the count: the number of txid prefix bits that select a shard.
    pub fn bits(self) -> u32 {
        self.0.trailing_zeros()
    }

    /// Every valid shard index for this count.
    pub fn indices(self) -> Range<u32> {
        0..self.0
    }

    pub fn check_index(self, index: u32) -> Result<(), ShardingError> {
        if index < self.0 {
            Ok(())
        } else {
            Err(ShardingError::IndexOutOfRange {
                index,
                count: self.0,
            })
        }
    }
}

impl Default for ShardCount {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for ShardCount {
    type Error = ShardingError;

    fn try_from(count: u32) -> Result<Self, Self::Error> {
        Self::new(count)
    }
}

impl From<ShardCount> for u32 {
    fn from(count: ShardCount) -> Self {
        count.0
    }
}

impl fmt::Display for ShardCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The first four display-order bytes of a txid as a big-endian integer.
pub fn txid_prefix(txid: &Hash) -> u32 {
    let b = txid.as_bytes();
    u32::from_be_bytes([b[31], b[30], b[29], b[28]])
}

/// Shard that owns `txid` under `count` shards.
pub fn shard_index(count: ShardCount, txid: &Hash) -> u32 {
    match count.bits() {
        0 => 0,
        bits => txid_prefix(txid) >> (32 - bits),
    }
}

/// Old shard indices that may hold entries belonging to new shard `new_index`
/// after changing the shard count from `old` to `new`.
///
/// Growing (or keeping) the count maps exactly one old shard in; shrinking
/// merges `old / new` contiguous old shards.
pub fn resharding_sources(
    old: ShardCount,
    new: ShardCount,
    new_index: u32,
) -> Result<Range<u32>, ShardingError> {
    new.check_index(new_index)?;
    if old.get() <= new.get() {
        let source = new_index >> (new.bits() - old.bits());
        Ok(source..source + 1)
    } else {
        let ratio = old.get() / new.get();
        let start = new_index * ratio;
        Ok(start..start + ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn random_txids(n: usize) -> Vec<Hash> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5EED);
        (0..n).map(|_| Hash(rng.gen())).collect()
    }

    fn txid_with_prefix(prefix: u32) -> Hash {
        let mut bytes = [0u8; 32];
        let be = prefix.to_be_bytes();
        bytes[31] = be[0];
        bytes[30] = be[1];
        bytes[29] = be[2];
        bytes[28] = be[3];
        Hash(bytes)
    }

    #[test]
    fn test_valid_counts() {
        for bits in 0..=30 {
            let count = ShardCount::new(1 << bits).unwrap();
            assert_eq!(count.bits(), bits);
        }
    }

    #[test]
    fn test_invalid_counts() {
        for bad in [0u32, 3, 6, 1000, 1 << 31, u32::MAX] {
            assert_eq!(
                ShardCount::new(bad),
                Err(ShardingError::InvalidShardCount(u64::from(bad)))
            );
        }
    }

    #[test]
    fn test_single_shard() {
        for txid in random_txids(32) {
            assert_eq!(shard_index(ShardCount::ONE, &txid), 0);
        }
    }

    #[test]
    fn test_index_uses_top_bits_of_display_prefix() {
        let count = ShardCount::new(16).unwrap();
        assert_eq!(shard_index(count, &txid_with_prefix(0x0000_0000)), 0);
        assert_eq!(shard_index(count, &txid_with_prefix(0x1FFF_FFFF)), 1);
        assert_eq!(shard_index(count, &txid_with_prefix(0xF000_0000)), 15);

        let display = Hash::from_hex(
            "a0ffffff00000000000000000000000000000000000000000000000000000000",
        )
        .unwrap();
        assert_eq!(shard_index(count, &display), 0xA);
    }

    #[test]
    fn test_index_in_range_and_pure() {
        let txids = random_txids(500);
        for bits in [0u32, 1, 4, 10, 20, 30] {
            let count = ShardCount::new(1 << bits).unwrap();
            for txid in &txids {
                let index = shard_index(count, txid);
                assert!(index < count.get());
                assert_eq!(index, shard_index(count, txid));
            }
        }
    }

    #[test]
    fn test_resharding_grow_maps_one_source() {
        let old = ShardCount::new(4).unwrap();
        let new = ShardCount::new(16).unwrap();
        for new_index in new.indices() {
            let sources = resharding_sources(old, new, new_index).unwrap();
            assert_eq!(sources.len(), 1);
            assert_eq!(sources.start, new_index / 4);
        }
        assert_eq!(resharding_sources(old, old, 3).unwrap(), 3..4);
    }

    #[test]
    fn test_resharding_shrink_sources_cover_new_shard() {
        let txids = random_txids(2000);
        for (old, new) in [(8u32, 4u32), (16, 2), (64, 1), (1024, 16)] {
            let old = ShardCount::new(old).unwrap();
            let new = ShardCount::new(new).unwrap();
            for new_index in new.indices() {
                let sources = resharding_sources(old, new, new_index).unwrap();
                assert_eq!(sources.len() as u32, old.get() / new.get());
                assert_eq!(sources.start, new_index * (old.get() / new.get()));

                for txid in &txids {
                    let in_new = shard_index(new, txid) == new_index;
                    let in_sources = sources.contains(&shard_index(old, txid));
                    assert_eq!(in_new, in_sources);
                }
            }
        }
    }

    #[test]
    fn test_resharding_grow_source_contains_every_entry() {
        let txids = random_txids(1000);
        let old = ShardCount::new(2).unwrap();
        let new = ShardCount::new(32).unwrap();
        for txid in &txids {
            let sources = resharding_sources(old, new, shard_index(new, txid)).unwrap();
            assert!(sources.contains(&shard_index(old, txid)));
        }
    }

    #[test]
    fn test_resharding_rejects_bad_index() {
        let count = ShardCount::new(4).unwrap();
        assert_eq!(
            resharding_sources(count, count, 4),
            Err(ShardingError::IndexOutOfRange { index: 4, count: 4 })
        );
    }

    #[test]
    fn test_serde_validates() {
        let count: ShardCount = bincode::deserialize(&bincode::serialize(&8u32).unwrap()).unwrap();
        assert_eq!(count.get(), 8);
        assert!(bincode::deserialize::<ShardCount>(&bincode::serialize(&6u32).unwrap()).is_err());
    }
}

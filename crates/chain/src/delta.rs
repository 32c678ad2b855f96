//! Per-block ledger changes, partitioned by shard.
//!
//! A [`BlockDelta`] is computed from a block before any shard is touched.
//! Outputs created and spent within the same block never reach a shard.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use utxoshard_core::{Block, Hash};
use utxoshard_storage::{shard_index, ShardCount, ShardDelta, Stx, Utx};

/// Errors raised while computing a block delta.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeltaError {
    #[error("block {height}: output {txid}:{index} spent twice")]
    DoubleSpend { height: u32, txid: Hash, index: u32 },

    #[error("block {height}: output {txid}:{index} spent in-block but never created")]
    MissingInBlockOutput { height: u32, txid: Hash, index: u32 },

    #[error("block {height}: transaction {txid} appears twice")]
    DuplicateTxid { height: u32, txid: Hash },
}

/// A txid that occurs in two blocks of the chain.
///
/// Its outputs are recorded at `first_height`; an occurrence at any other
/// height, `repeat_height` included, is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateTxid {
    pub txid: Hash,
    pub first_height: u32,
    pub repeat_height: u32,
}

/// The two main-net coinbase txids that were mined twice.
pub const MAINNET_DUPLICATES: [DuplicateTxid; 2] = [
    // d5d27987d2a3dfc724e359870c6644b40e497bdc0589a033220fe15429d88599
    DuplicateTxid {
        txid: Hash([
            0x99, 0x85, 0xd8, 0x29, 0x54, 0xe1, 0x0f, 0x22, 0x33, 0xa0, 0x89, 0x05, 0xdc, 0x7b,
            0x49, 0x0e, 0xb4, 0x44, 0x66, 0x0c, 0x87, 0x59, 0xe3, 0x24, 0xc7, 0xdf, 0xa3, 0xd2,
            0x87, 0x79, 0xd2, 0xd5,
        ]),
        first_height: 91812,
        repeat_height: 91842,
    },
    // e3bf3d07d4b0375638d5f1db5255fe07ba2c4cb067cd81b84ee974b6585fb468
    DuplicateTxid {
        txid: Hash([
            0x68, 0xb4, 0x5f, 0x58, 0xb6, 0x74, 0xe9, 0x4e, 0xb8, 0x81, 0xcd, 0x67, 0xb0, 0x4c,
            0x2c, 0xba, 0x07, 0xfe, 0x55, 0x52, 0xdb, 0xf1, 0xd5, 0x38, 0x56, 0x37, 0xb0, 0xd4,
            0x07, 0x3d, 0xbf, 0xe3,
        ]),
        first_height: 91722,
        repeat_height: 91880,
    },
];

/// True if the occurrence of `txid` at `height` must be ignored.
pub fn is_ignored_duplicate(duplicates: &[DuplicateTxid], txid: &Hash, height: u32) -> bool {
    duplicates
        .iter()
        .any(|dup| dup.txid == *txid && dup.first_height != height)
}

/// The changes one block makes to the ledger, grouped by shard index.
#[derive(Debug, Clone)]
pub struct BlockDelta {
    height: u32,
    blockhash: Hash,
    shard_count: ShardCount,
    shards: BTreeMap<u32, ShardDelta>,
    skipped_duplicates: Vec<Hash>,
    tx_count: usize,
    spent_outputs: usize,
    created_outputs: usize,
    in_block_spends: usize,
}

impl BlockDelta {
    /// Delta of `block` under `count` shards, with the main-net duplicates.
    pub fn build(block: &Block, count: ShardCount) -> Result<Self, DeltaError> {
        Self::build_with_duplicates(block, count, &MAINNET_DUPLICATES)
    }

    pub fn build_with_duplicates(
        block: &Block,
        count: ShardCount,
        duplicates: &[DuplicateTxid],
    ) -> Result<Self, DeltaError> {
        let height = block.height();
        let mut creates: BTreeMap<Hash, Utx> = BTreeMap::new();
        let mut spends: BTreeMap<Hash, Stx> = BTreeMap::new();
        let mut spent: BTreeSet<(Hash, u32)> = BTreeSet::new();
        let mut skipped_duplicates = Vec::new();
        let mut spent_outputs = 0;
        let mut created_outputs = 0;
        let mut in_block_spends = 0;

        for tx in block.transactions() {
            if !tx.is_coinbase() {
                for input in tx.inputs() {
                    let (txid, index) = (input.prev_txid, input.prev_index);
                    if !spent.insert((txid, index)) {
                        return Err(DeltaError::DoubleSpend { height, txid, index });
                    }
                    spent_outputs += 1;

                    if let Some(entry) = creates.get_mut(&txid) {
                        entry
                            .spend(index)
                            .map_err(|_| DeltaError::MissingInBlockOutput { height, txid, index })?;
                        in_block_spends += 1;
                    } else {
                        spends
                            .entry(txid)
                            .or_insert_with(|| Stx::new(txid))
                            .add(input.clone());
                    }
                }
            }

            let txid = tx.txid();
            if is_ignored_duplicate(duplicates, &txid, height) {
                tracing::warn!(height, %txid, "ignoring repeated txid");
                skipped_duplicates.push(txid);
                continue;
            }
            if creates.contains_key(&txid) {
                return Err(DeltaError::DuplicateTxid { height, txid });
            }
            created_outputs += tx.outputs().len();
            creates.insert(txid, Utx::from_transaction(tx, height));
        }

        let mut shards: BTreeMap<u32, ShardDelta> = BTreeMap::new();
        for (txid, stx) in spends {
            shards
                .entry(shard_index(count, &txid))
                .or_default()
                .spends
                .push(stx);
        }
        for (txid, entry) in creates {
            // Fully spent in-block, or created without outputs.
            if entry.is_empty() {
                continue;
            }
            shards
                .entry(shard_index(count, &txid))
                .or_default()
                .creates
                .push(entry);
        }

        Ok(Self {
            height,
            blockhash: block.hash(),
            shard_count: count,
            shards,
            skipped_duplicates,
            tx_count: block.tx_count(),
            spent_outputs,
            created_outputs,
            in_block_spends,
        })
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn blockhash(&self) -> Hash {
        self.blockhash
    }

    pub fn shard_count(&self) -> ShardCount {
        self.shard_count
    }

    /// Indices of the shards this block touches, ascending.
    pub fn affected_shards(&self) -> Vec<u32> {
        self.shards.keys().copied().collect()
    }

    pub fn shard(&self, index: u32) -> Option<&ShardDelta> {
        self.shards.get(&index)
    }

    pub fn shards(&self) -> &BTreeMap<u32, ShardDelta> {
        &self.shards
    }

    /// Txids ignored because they repeat an earlier transaction.
    pub fn skipped_duplicates(&self) -> &[Hash] {
        &self.skipped_duplicates
    }

    pub fn tx_count(&self) -> usize {
        self.tx_count
    }

    /// Every output consumed by the block, in-block spends included.
    pub fn spent_outputs(&self) -> usize {
        self.spent_outputs
    }

    /// Every output created by the block, in-block spends included.
    pub fn created_outputs(&self) -> usize {
        self.created_outputs
    }

    /// Spends resolved against outputs created earlier in the same block.
    pub fn in_block_spends(&self) -> usize {
        self.in_block_spends
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use utxoshard_core::{Transaction, TxIn, TxOut};

    fn coinbase(tag: u8, outputs: usize) -> Transaction {
        Transaction::new(
            1,
            vec![TxIn {
                prev_txid: Hash::ZERO,
                prev_index: u32::MAX,
                script_sig: vec![tag],
                sequence: u32::MAX,
            }],
            (0..outputs).map(|i| TxOut::new(50 + i as i64, vec![0x51])).collect(),
            None,
            0,
        )
    }

    fn spend(prevs: &[(Hash, u32)], outputs: usize) -> Transaction {
        Transaction::new(
            2,
            prevs
                .iter()
                .map(|(txid, index)| TxIn {
                    prev_txid: *txid,
                    prev_index: *index,
                    script_sig: vec![],
                    sequence: 0,
                })
                .collect(),
            (0..outputs).map(|i| TxOut::new(i as i64, vec![0x52])).collect(),
            None,
            0,
        )
    }

    fn block(txs: Vec<Transaction>, height: u32) -> Block {
        Block::assemble(1, Hash::ZERO, 0, 0, 0, txs, height).unwrap()
    }

    fn four() -> ShardCount {
        ShardCount::new(4).unwrap()
    }

    #[test]
    fn test_duplicate_table() {
        let d5 = Hash::from_hex("d5d27987d2a3dfc724e359870c6644b40e497bdc0589a033220fe15429d88599")
            .unwrap();
        let e3 = Hash::from_hex("e3bf3d07d4b0375638d5f1db5255fe07ba2c4cb067cd81b84ee974b6585fb468")
            .unwrap();
        assert_eq!(MAINNET_DUPLICATES[0].txid, d5);
        assert_eq!(MAINNET_DUPLICATES[1].txid, e3);

        assert!(is_ignored_duplicate(&MAINNET_DUPLICATES, &d5, 91842));
        assert!(!is_ignored_duplicate(&MAINNET_DUPLICATES, &d5, 91812));
        assert!(is_ignored_duplicate(&MAINNET_DUPLICATES, &e3, 91880));
        assert!(!is_ignored_duplicate(&MAINNET_DUPLICATES, &e3, 91722));
        assert!(is_ignored_duplicate(&MAINNET_DUPLICATES, &e3, 91842));
        assert!(!is_ignored_duplicate(&MAINNET_DUPLICATES, &hash_of(b"other"), 91842));
    }

    #[test]
    fn test_coinbase_only_block() {
        let cb = coinbase(1, 2);
        let delta = BlockDelta::build(&block(vec![cb.clone()], 0), four()).unwrap();
        let index = shard_index(four(), &cb.txid());

        assert_eq!(delta.affected_shards(), vec![index]);
        let shard = delta.shard(index).unwrap();
        assert!(shard.spends.is_empty());
        assert_eq!(shard.creates.len(), 1);
        assert!(shard.creates[0].is_coinbase());
        assert_eq!(delta.spent_outputs(), 0);
        assert_eq!(delta.created_outputs(), 2);
    }

    #[test]
    fn test_spends_grouped_by_previous_txid() {
        let funding = hash_of(b"funding");
        let other = hash_of(b"other");
        let txs = vec![
            coinbase(2, 1),
            spend(&[(funding, 0), (other, 3)], 1),
            spend(&[(funding, 2)], 1),
        ];
        let delta = BlockDelta::build(&block(txs, 5), four()).unwrap();

        let stx = delta
            .shards()
            .values()
            .flat_map(|shard| shard.spends.iter())
            .find(|stx| stx.txid() == funding)
            .unwrap();
        assert_eq!(stx.indices().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(delta.spent_outputs(), 3);

        for (index, shard) in delta.shards() {
            for stx in &shard.spends {
                assert_eq!(shard_index(four(), &stx.txid()), *index);
            }
            for entry in &shard.creates {
                assert_eq!(shard_index(four(), &entry.txid()), *index);
            }
        }
    }

    #[test]
    fn test_in_block_spend_resolved_locally() {
        let parent = spend(&[(hash_of(b"outside"), 0)], 2);
        let child = spend(&[(parent.txid(), 0)], 1);
        let grandchild = spend(&[(parent.txid(), 1), (child.txid(), 0)], 1);
        let (parent_id, child_id, grandchild_id) = (parent.txid(), child.txid(), grandchild.txid());

        let delta =
            BlockDelta::build(&block(vec![coinbase(3, 1), parent, child, grandchild], 9), four())
                .unwrap();
        assert_eq!(delta.in_block_spends(), 3);

        let created: Vec<Hash> = delta
            .shards()
            .values()
            .flat_map(|shard| shard.creates.iter().map(Utx::txid))
            .collect();
        assert!(!created.contains(&parent_id));
        assert!(!created.contains(&child_id));
        assert!(created.contains(&grandchild_id));

        let spent: Vec<Hash> = delta
            .shards()
            .values()
            .flat_map(|shard| shard.spends.iter().map(Stx::txid))
            .collect();
        assert_eq!(spent, vec![hash_of(b"outside")]);
    }

    #[test]
    fn test_double_spend_rejected() {
        let prev = hash_of(b"prev");
        let txs = vec![coinbase(4, 1), spend(&[(prev, 1)], 1), spend(&[(prev, 1)], 2)];
        assert_eq!(
            BlockDelta::build(&block(txs, 7), four()).unwrap_err(),
            DeltaError::DoubleSpend {
                height: 7,
                txid: prev,
                index: 1
            }
        );
    }

    #[test]
    fn test_missing_in_block_output() {
        let parent = spend(&[(hash_of(b"x"), 0)], 1);
        let child = spend(&[(parent.txid(), 5)], 1);
        let parent_id = parent.txid();
        assert_eq!(
            BlockDelta::build(&block(vec![coinbase(5, 1), parent, child], 3), four()).unwrap_err(),
            DeltaError::MissingInBlockOutput {
                height: 3,
                txid: parent_id,
                index: 5
            }
        );
    }

    #[test]
    fn test_repeated_txid_recorded_only_at_first_height() {
        let cb = coinbase(6, 1);
        let table = [DuplicateTxid {
            txid: cb.txid(),
            first_height: 10,
            repeat_height: 20,
        }];

        let first =
            BlockDelta::build_with_duplicates(&block(vec![cb.clone()], 10), four(), &table)
                .unwrap();
        assert!(first.skipped_duplicates().is_empty());
        assert_eq!(first.affected_shards().len(), 1);

        for height in [20, 30] {
            let repeat =
                BlockDelta::build_with_duplicates(&block(vec![cb.clone()], height), four(), &table)
                    .unwrap();
            assert_eq!(repeat.skipped_duplicates(), &[cb.txid()]);
            assert!(repeat.shards().is_empty());
            assert_eq!(repeat.created_outputs(), 0);
        }
    }

    fn hash_of(data: &[u8]) -> Hash {
        utxoshard_core::hash(data)
    }
}

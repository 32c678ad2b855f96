//! Ingestion of generated chains with spends, in-block chains and repeated txids.

use utxoshard_chain::{BlockDelta, Committer, DuplicateTxid, ExecutionMode};
use utxoshard_core::{Block, Hash, Transaction, TxIn, TxOut};
use utxoshard_storage::{MapShardFactory, ShardCount, UtxoSet};

fn coinbase(height: u32) -> Transaction {
    Transaction::new(
        1,
        vec![TxIn {
            prev_txid: Hash::ZERO,
            prev_index: u32::MAX,
            script_sig: height.to_le_bytes().to_vec(),
            sequence: u32::MAX,
        }],
        (0..4).map(|i| TxOut::new(1000 + i, vec![0x51, i as u8])).collect(),
        None,
        0,
    )
}

fn pay(inputs: &[(Hash, u32)], outputs: usize, tag: u32) -> Transaction {
    Transaction::new(
        2,
        inputs
            .iter()
            .map(|(txid, index)| TxIn {
                prev_txid: *txid,
                prev_index: *index,
                script_sig: vec![0x00],
                sequence: u32::MAX,
            })
            .collect(),
        (0..outputs).map(|i| TxOut::new(i as i64 + 1, vec![0x52])).collect(),
        None,
        tag,
    )
}

/// A chain where each block spends every output of the previous block's
/// coinbase and chains one payment on another within the block.
fn generated_chain(len: u32) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut prev = Hash::ZERO;
    let mut previous_coinbase: Option<Hash> = None;
    for height in 0..len {
        let mut txs = vec![coinbase(height)];
        if let Some(funding) = previous_coinbase {
            let first = pay(&[(funding, 0), (funding, 1)], 3, height);
            let second = pay(&[(first.txid(), 2), (funding, 2)], 2, height);
            let third = pay(&[(funding, 3)], 1, height);
            txs.extend([first, second, third]);
        }
        previous_coinbase = Some(txs[0].txid());
        let block = Block::assemble(1, prev, height, 0, height, txs, height).unwrap();
        prev = block.hash();
        blocks.push(block);
    }
    blocks
}

fn ingest(committer: &Committer, shards: u32, blocks: &[Block]) -> UtxoSet {
    let mut set = UtxoSet::new(ShardCount::new(shards).unwrap(), &MapShardFactory).unwrap();
    for block in blocks {
        committer.commit(&mut set, block).unwrap();
    }
    set
}

#[test]
fn test_spent_coinbases_leave_the_set() {
    let blocks = generated_chain(10);
    let set = ingest(&Committer::sequential(), 16, &blocks);

    // Only the last coinbase is unspent. Each payment block leaves
    // 2 + 2 + 1 outputs.
    let last_coinbase = blocks[9].coinbase().txid();
    assert_eq!(set.get(&last_coinbase).unwrap().len(), 4);
    for block in &blocks[..9] {
        assert!(set.get(&block.coinbase().txid()).is_none());
    }
    assert_eq!(set.totals().outputs, 4 + 9 * 5);
}

#[test]
fn test_pooled_and_sequential_roots_agree() {
    let blocks = generated_chain(25);
    let sequential = Committer::sequential().with_verify_root(true);
    let pooled = Committer::pooled(4).unwrap().with_verify_root(true);
    assert_eq!(pooled.mode(), ExecutionMode::Pooled { workers: 4 });

    for shards in [1u32, 4, 64] {
        let left = ingest(&sequential, shards, &blocks);
        let right = ingest(&pooled, shards, &blocks);
        assert_eq!(left.global_root(), right.global_root());
        assert_eq!(left.shard_hashes().unwrap(), right.shard_hashes().unwrap());
    }
}

#[test]
fn test_shard_count_does_not_change_contents() {
    let blocks = generated_chain(12);
    let committer = Committer::sequential();
    let four = ingest(&committer, 4, &blocks);
    let many = ingest(&committer, 256, &blocks);
    assert_eq!(four.totals().entries, many.totals().entries);
    assert_eq!(four.totals().outputs, many.totals().outputs);

    let resharded = four.reshard(ShardCount::new(256).unwrap(), &MapShardFactory).unwrap();
    assert_eq!(resharded.shard_hashes().unwrap(), many.shard_hashes().unwrap());
}

#[test]
fn test_repeated_txid_recorded_once() {
    // The coinbase of block 3 reappears verbatim in block 5.
    let mut blocks = generated_chain(5);
    let repeated = blocks[3].coinbase().clone();
    let block5 = Block::assemble(1, blocks[4].hash(), 5, 0, 5, vec![repeated.clone()], 5).unwrap();
    blocks.push(block5);

    let table = vec![DuplicateTxid {
        txid: repeated.txid(),
        first_height: 3,
        repeat_height: 5,
    }];
    let delta = BlockDelta::build_with_duplicates(&blocks[5], ShardCount::new(4).unwrap(), &table)
        .unwrap();
    assert_eq!(delta.skipped_duplicates(), &[repeated.txid()]);

    let committer = Committer::sequential().with_duplicates(table);
    let mut set = UtxoSet::new(ShardCount::new(4).unwrap(), &MapShardFactory).unwrap();
    let mut skipped = 0;
    for block in &blocks {
        skipped += committer.commit(&mut set, block).unwrap().skipped_duplicates;
    }
    assert_eq!(skipped, 1);
    assert_eq!(set.best_height(), Some(5));
    // Block 4 spent the original fully, so it stays gone.
    assert!(set.get(&repeated.txid()).is_none());

    // Without the table the repeat collides with nothing here, so it is
    // recorded again.
    let plain = ingest(&Committer::sequential().with_duplicates(vec![]), 4, &blocks);
    assert_eq!(plain.get(&repeated.txid()).unwrap().height(), 5);
}

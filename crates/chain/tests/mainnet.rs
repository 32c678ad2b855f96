//! Ingestion of the first two main-net blocks.

use std::fs;
use utxoshard_chain::{
    Committer, CommitError, Cycle, DirSource, IngestConfig, MemorySource, Sequencer, StopReason,
};
use utxoshard_core::{Block, Hash, MAINNET_GENESIS_HASH};
use utxoshard_storage::{
    shard_index, MapShardFactory, ShardCount, ShardPersistence, SledPersistence, Storage, UtxoSet,
};

const GENESIS_HEX: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c0101000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4d04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000";

const BLOCK1_HEX: &str = "010000006fe28c0ab6f1b372c1a6a246ae63f74f931e8365e15a089c68d6190000000000982051fd1e4ba744bbbe680e1fee14677ba1a3c3540bf7b1cdb606e857233e0e61bc6649ffff001d01e362990101000000010000000000000000000000000000000000000000000000000000000000000000ffffffff0704ffff001d0104ffffffff0100f2052a0100000043410496b538e853519c726a2c91e61ec11600ae1390813a627c66fb8be7947be63c52da7589379515d4e0a604f8141781e62294721166bf621e73a82cbf2342c858eeac00000000";

const BLOCK1_HASH: &str = "00000000839a8e6886ab5951d76f411475428afc90947ee320161bbf18eb6048";
const GENESIS_TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";
const BLOCK1_TXID: &str = "0e3e2357e806b6cdb1f70b54c3a3a17b6714ee1f0e68bebb44a74b1efd512098";

fn raw_blocks() -> Vec<Vec<u8>> {
    vec![
        hex::decode(GENESIS_HEX).unwrap(),
        hex::decode(BLOCK1_HEX).unwrap(),
    ]
}

fn genesis_hash() -> Hash {
    Hash::from_hex(MAINNET_GENESIS_HASH).unwrap()
}

fn config() -> IngestConfig {
    IngestConfig {
        shard_count: ShardCount::new(8).unwrap(),
        verify_root: true,
        genesis_hash: Some(genesis_hash()),
        ..IngestConfig::default()
    }
}

fn empty_set(config: &IngestConfig) -> UtxoSet {
    UtxoSet::new(config.shard_count, &MapShardFactory).unwrap()
}

#[test]
fn test_ingest_first_two_blocks() {
    let config = config();
    let sequencer =
        Sequencer::from_config(MemorySource::from_raw(0, raw_blocks()), empty_set(&config), &config)
            .unwrap();

    let report = sequencer.run().unwrap();
    assert_eq!(report.blocks, 2);
    assert_eq!(report.transactions, 2);
    assert_eq!(report.stop, StopReason::EndOfRange);

    let latest = sequencer.latest().unwrap();
    assert_eq!(latest.height, 1);
    assert_eq!(latest.blockhash.to_hex(), BLOCK1_HASH);

    let set = sequencer.into_set();
    assert_eq!(set.totals().entries, 2);
    assert_eq!(set.totals().outputs, 2);

    for txid in [GENESIS_TXID, BLOCK1_TXID] {
        let txid = Hash::from_hex(txid).unwrap();
        let entry = set.get(&txid).unwrap();
        assert!(entry.is_coinbase());
        assert_eq!(entry.output(0).unwrap().value, 50_0000_0000);
        assert_eq!(
            set.shard_for(&txid).index(),
            shard_index(set.shard_count(), &txid)
        );
    }
    assert_eq!(set.global_root(), Some(set.compute_global_root().unwrap()));
}

#[test]
fn test_wrong_genesis_rejected() {
    let config = IngestConfig {
        genesis_hash: Some(Hash::from_hex(BLOCK1_HASH).unwrap()),
        ..config()
    };
    let sequencer =
        Sequencer::from_config(MemorySource::from_raw(0, raw_blocks()), empty_set(&config), &config)
            .unwrap();
    assert!(sequencer.run().is_err());
    assert!(sequencer.with_set(|set| set.best_height().is_none() && !set.is_poisoned()));
}

#[test]
fn test_prev_hash_mismatch_does_not_mutate() {
    let mut set = UtxoSet::new(ShardCount::new(4).unwrap(), &MapShardFactory).unwrap();
    let committer = Committer::sequential().with_verify_root(true);
    let genesis = Block::decode(&raw_blocks()[0], 0, Some(genesis_hash())).unwrap();
    committer.commit(&mut set, &genesis).unwrap();
    let hashes = set.shard_hashes().unwrap();

    // Block 1 bytes with the prev blockhash field corrupted.
    let mut bytes = raw_blocks().remove(1);
    bytes[4] ^= 0xFF;
    let forked = Block::decode(&bytes, 1, None).unwrap();

    assert!(matches!(
        committer.commit(&mut set, &forked),
        Err(CommitError::PrevHashMismatch { height: 1, .. })
    ));
    assert_eq!(set.shard_hashes().unwrap(), hashes);
    assert_eq!(set.best_blockhash(), Some(genesis.hash()));
    assert!(!set.is_poisoned());
}

#[test]
fn test_dir_source_checkpoint_and_resume() {
    let blocks = tempfile::tempdir().unwrap();
    let raw = raw_blocks();
    fs::write(blocks.path().join("0.hex"), GENESIS_HEX).unwrap();
    fs::write(blocks.path().join("1.bin"), &raw[1]).unwrap();

    let config = config();
    let storage = Storage::open_temporary().unwrap();

    // Genesis only.
    let first = Sequencer::from_config(
        DirSource::new(blocks.path(), 0).with_stop_height(0),
        empty_set(&config),
        &config,
    )
    .unwrap()
    .with_persistence(Box::new(SledPersistence::new(storage.clone())));
    assert_eq!(first.run().unwrap().checkpoints, 1);

    let persistence = SledPersistence::new(storage.clone());
    let restored = persistence.load_set(&MapShardFactory).unwrap().unwrap();
    let resume_at = restored.best_height().map_or(0, |height| height + 1);
    assert_eq!(resume_at, 1);

    let second = Sequencer::from_config(DirSource::new(blocks.path(), resume_at), restored, &config)
        .unwrap()
        .with_persistence(Box::new(SledPersistence::new(storage.clone())));
    match second.cycle().unwrap() {
        Cycle::Committed(summary) => assert_eq!(summary.blockhash.to_hex(), BLOCK1_HASH),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(second.cycle().unwrap(), Cycle::EndOfRange);
    second.run().unwrap();

    let reloaded = persistence.load_set(&MapShardFactory).unwrap().unwrap();
    assert_eq!(reloaded.best_height(), Some(1));
    assert_eq!(reloaded.totals().entries, 2);
}

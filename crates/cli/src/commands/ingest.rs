//! Ingest blocks command.

use super::data_dir::{parse_hash, parse_shard_count, DataDir, DirConfig};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use utxoshard_chain::{DirSource, IngestConfig, Sequencer, StopReason};
use utxoshard_core::MAINNET_GENESIS_HASH;
use utxoshard_storage::{MapShardFactory, ShardPersistence, SledPersistence, UtxoSet};

#[derive(Args)]
pub struct IngestArgs {
    /// Directory of `<height>.bin` or `<height>.hex` block files
    #[arg(short, long)]
    blocks: PathBuf,

    /// Directory to store the UTXO set
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Shard count (power of two) for a new data directory
    #[arg(short, long)]
    shards: Option<u32>,

    /// Apply workers; 0 or 1 applies sequentially
    #[arg(short, long, default_value = "0")]
    workers: usize,

    /// Recompute the global root after every block
    #[arg(long)]
    verify_root: bool,

    /// Checkpoint every N blocks (0 checkpoints only at the end)
    #[arg(long, default_value = "0")]
    checkpoint_every: u32,

    /// Log progress every N blocks
    #[arg(long, default_value = "1000")]
    progress_every: u32,

    /// Required genesis blockhash (display hex)
    #[arg(long, conflicts_with = "mainnet")]
    genesis: Option<String>,

    /// Require the main-net genesis block
    #[arg(long)]
    mainnet: bool,

    /// Stop after this height
    #[arg(long)]
    to: Option<u32>,
}

pub fn run(args: IngestArgs) -> Result<()> {
    let data_dir = DataDir::new(&args.data_dir);
    let genesis = if args.mainnet {
        Some(parse_hash(MAINNET_GENESIS_HASH)?)
    } else {
        args.genesis.as_deref().map(parse_hash).transpose()?
    };

    let mut dir_config = match data_dir.load_config()? {
        Some(existing) => {
            if let Some(shards) = args.shards {
                if shards != existing.shard_count.get() {
                    bail!(
                        "Data directory uses {} shards; run 'utxoshard reshard' to change it",
                        existing.shard_count
                    );
                }
            }
            if genesis.is_some() && existing.genesis()? != genesis {
                bail!("Data directory was created with a different genesis hash");
            }
            existing
        }
        None => {
            let shard_count = match args.shards {
                Some(shards) => parse_shard_count(shards)?,
                None => IngestConfig::default().shard_count,
            };
            let config = DirConfig::new(shard_count, genesis);
            data_dir.save_config(&config)?;
            println!(
                "{}  Created data directory with {} shards",
                "✓".green().bold(),
                shard_count.to_string().bright_cyan()
            );
            config
        }
    };

    let config = IngestConfig {
        shard_count: dir_config.shard_count,
        workers: args.workers,
        verify_root: args.verify_root,
        genesis_hash: dir_config.genesis()?,
        checkpoint_every: args.checkpoint_every,
        progress_every: args.progress_every,
    };

    let storage = data_dir.open_storage()?;
    let persistence = SledPersistence::new(storage);
    let set = match persistence
        .load_set(&MapShardFactory)
        .with_context(|| "Failed to load UTXO set")?
    {
        Some(set) => set,
        None => UtxoSet::new(config.shard_count, &MapShardFactory)?,
    };
    let start = set.best_height().map_or(0, |height| height + 1);

    let mut source = DirSource::new(&args.blocks, start);
    if let Some(to) = args.to {
        source = source.with_stop_height(to);
    }

    println!(
        "{} from height {} ({} workers)",
        "Ingesting".bold().cyan(),
        start.to_string().bright_cyan(),
        args.workers.max(1)
    );
    tracing::info!(start, shards = %config.shard_count, workers = args.workers, "ingest started");

    let sequencer = Sequencer::from_config(source, set, &config)?
        .with_persistence(Box::new(persistence));
    let report = sequencer.run()?;

    dir_config.updated_at = Utc::now();
    data_dir.save_config(&dir_config)?;

    println!();
    match sequencer.latest() {
        Some(latest) => {
            println!("{}  Committed {} blocks", "✓".green().bold(), report.blocks);
            println!("    Height: {}", latest.height.to_string().bright_cyan());
            println!("    Hash: {}", latest.blockhash.to_hex().bright_yellow());
        }
        None => println!("{}", "No blocks found".yellow()),
    }
    println!("    Transactions: {}", report.transactions);
    println!("    Checkpoints: {}", report.checkpoints);
    println!("    Elapsed: {:.2?}", report.elapsed);
    if report.stop == StopReason::Closed {
        println!("{}", "Stopped before the end of the range".yellow());
    }
    sequencer.with_set(|set| {
        if let Some(root) = set.global_root() {
            println!("    Global root: {}", root.to_hex().bright_yellow());
        }
    });

    Ok(())
}

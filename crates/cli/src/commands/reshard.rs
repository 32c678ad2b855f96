//! Reshard a stored UTXO set.

use super::data_dir::{parse_shard_count, DataDir};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use utxoshard_storage::{MapShardFactory, ShardPersistence};

#[derive(Args)]
pub struct ReshardArgs {
    /// Directory of the UTXO set
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// New shard count (power of two)
    #[arg(short, long)]
    shards: u32,
}

pub fn run(args: ReshardArgs) -> Result<()> {
    let data_dir = DataDir::new(&args.data_dir);
    let (mut config, persistence, set) = data_dir.open_existing()?;
    let new_count = parse_shard_count(args.shards)?;

    if new_count == set.shard_count() {
        println!("Set already has {} shards", new_count);
        return Ok(());
    }

    let resharded = set
        .reshard(new_count, &MapShardFactory)
        .with_context(|| "Failed to reshard")?;
    persistence
        .save_set(&resharded)
        .with_context(|| "Failed to store resharded set")?;

    config.shard_count = new_count;
    config.updated_at = Utc::now();
    data_dir.save_config(&config)?;

    println!(
        "{}  Resharded {} -> {} shards",
        "✓".green().bold(),
        set.shard_count(),
        new_count.to_string().bright_cyan()
    );
    println!("    Entries: {}", resharded.totals().entries);
    if let Some(root) = resharded.global_root() {
        println!("    Global root: {}", root.to_hex().bright_yellow());
    }

    Ok(())
}

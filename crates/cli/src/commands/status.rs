//! Show UTXO set status.

use super::data_dir::DataDir;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args)]
pub struct StatusArgs {
    /// Directory of the UTXO set
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,
}

pub fn run(args: StatusArgs) -> Result<()> {
    let (config, _, set) = DataDir::new(&args.data_dir).open_existing()?;
    let totals = set.totals();

    println!();
    println!("{}", "UTXO Set:".bold().cyan());
    println!();
    match set.tip() {
        Some(tip) => {
            println!("  Height:      {}", tip.height.to_string().bright_cyan());
            println!("  Blockhash:   {}", tip.blockhash.to_hex().bright_yellow());
        }
        None => println!("  Height:      {}", "empty".bright_black()),
    }
    println!("  Shards:      {}", set.shard_count());
    println!("  Entries:     {}", totals.entries);
    println!("  Outputs:     {}", totals.outputs);
    println!(
        "  Size:        {} bytes stored, {} bytes protocol",
        totals.storage_bytes, totals.protocol_bytes
    );
    match set.global_root() {
        Some(root) => println!("  Global root: {}", root.to_hex().bright_yellow()),
        None => println!("  Global root: {}", "not tracked".bright_black()),
    }
    if let Some(genesis) = &config.genesis_hash {
        println!("  Genesis:     {}", genesis);
    }
    println!(
        "  Updated:     {}",
        config.updated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string().bright_black()
    );

    Ok(())
}

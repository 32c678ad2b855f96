//! Verify stored shards against the global root.

use super::data_dir::DataDir;
use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use utxoshard_core::verify_proof;

#[derive(Args)]
pub struct VerifyArgs {
    /// Directory of the UTXO set
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,
}

pub fn run(args: VerifyArgs) -> Result<()> {
    // Loading already rejects a stored root that does not match.
    let (_, _, set) = DataDir::new(&args.data_dir).open_existing()?;

    let tree = set.shard_tree().with_context(|| "Failed to hash shards")?;
    let root = tree.root();
    for index in 0..tree.leaf_count() {
        let proof = tree
            .proof(index)
            .with_context(|| format!("No inclusion proof for shard {}", index))?;
        if !verify_proof(&root, &proof) {
            bail!("Shard {} does not verify against the global root", index);
        }
    }

    println!(
        "{}  {} shards verified",
        "✓".green().bold(),
        tree.leaf_count()
    );
    println!("    Computed root: {}", root.to_hex().bright_yellow());
    match set.global_root() {
        Some(stored) => println!("    Stored root:   {}", stored.to_hex().bright_yellow()),
        None => println!("    Stored root:   {}", "not tracked".bright_black()),
    }
    if let Some(tip) = set.tip() {
        println!("    At height:     {}", tip.height.to_string().bright_cyan());
    }

    Ok(())
}

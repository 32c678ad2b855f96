//! CLI commands module.

use anyhow::Result;
use clap::Subcommand;

mod data_dir;
mod decode;
mod ingest;
mod reshard;
mod status;
mod verify;

#[derive(Subcommand)]
pub enum Commands {
    /// Apply blocks from a directory to the UTXO set
    Ingest(ingest::IngestArgs),
    /// Show the tip and size of a stored UTXO set
    Status(status::StatusArgs),
    /// Recompute every shard hash and the global root
    Verify(verify::VerifyArgs),
    /// Rebuild the stored set under a new shard count
    Reshard(reshard::ReshardArgs),
    /// Parse a raw block and print it as JSON
    Decode(decode::DecodeArgs),
}

pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Ingest(args) => ingest::run(args),
        Commands::Status(args) => status::run(args),
        Commands::Verify(args) => verify::run(args),
        Commands::Reshard(args) => reshard::run(args),
        Commands::Decode(args) => decode::run(args),
    }
}

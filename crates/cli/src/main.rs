//! utxoshard CLI entry point.

use clap::Parser;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "utxoshard")]
#[command(about = "Sharded UTXO set builder for Bitcoin-style block data", long_about = None)]
struct Cli {
    /// Default log filter when RUST_LOG is not set
    #[arg(long, global = true, default_value = "utxoshard=info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = logging::LogFormat::Pretty)]
    log_format: logging::LogFormat,

    #[command(subcommand)]
    command: Option<commands::Commands>,
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level, cli.log_format);

    match cli.command {
        Some(cmd) => {
            if let Err(e) = commands::run(cmd) {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("utxoshard - Sharded UTXO set builder");
            println!("Run 'utxoshard --help' for usage information.");
        }
    }
}

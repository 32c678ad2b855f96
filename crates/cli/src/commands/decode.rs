//! Decode a raw block file.

use super::data_dir::parse_hash;
use anyhow::{Context, Result};
use chrono::DateTime;
use clap::Args;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use utxoshard_core::Block;

#[derive(Args)]
pub struct DecodeArgs {
    /// Block file: raw bytes, or hex text if it ends in `.hex`
    file: PathBuf,

    /// Height to attribute the block to
    #[arg(long, default_value = "0")]
    height: u32,

    /// Expected blockhash (display hex)
    #[arg(long)]
    expect: Option<String>,

    /// Omit per-transaction detail
    #[arg(long)]
    summary: bool,
}

pub fn run(args: DecodeArgs) -> Result<()> {
    let bytes = fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let bytes = if args.file.extension().is_some_and(|ext| ext == "hex") {
        hex::decode(String::from_utf8_lossy(&bytes).trim()).with_context(|| "Invalid hex")?
    } else {
        bytes
    };
    let expected = args.expect.as_deref().map(parse_hash).transpose()?;

    let block = Block::decode(&bytes, args.height, expected)?;
    println!("{}", serde_json::to_string_pretty(&describe(&block, !args.summary))?);
    Ok(())
}

fn describe(block: &Block, with_transactions: bool) -> serde_json::Value {
    let header = block.header();
    let time = DateTime::from_timestamp(i64::from(header.time), 0)
        .map(|time| time.to_rfc3339())
        .unwrap_or_default();

    let mut value = json!({
        "hash": block.hash().to_hex(),
        "height": block.height(),
        "version": header.version,
        "prev_blockhash": header.prev_blockhash.to_hex(),
        "merkle_root": header.merkle_root.to_hex(),
        "time": header.time,
        "time_utc": time,
        "bits": format!("{:08x}", header.bits),
        "nonce": header.nonce,
        "tx_count": block.tx_count(),
    });

    if with_transactions {
        let transactions: Vec<serde_json::Value> = block
            .transactions()
            .iter()
            .map(|tx| {
                json!({
                    "txid": tx.txid().to_hex(),
                    "coinbase": tx.is_coinbase(),
                    "witness": tx.has_witness(),
                    "inputs": tx.inputs().iter().map(|input| json!({
                        "prev_txid": input.prev_txid.to_hex(),
                        "prev_index": input.prev_index,
                    })).collect::<Vec<_>>(),
                    "outputs": tx.outputs().iter().map(|output| json!({
                        "value": output.value,
                        "script_pubkey": hex::encode(&output.script_pubkey),
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        value["transactions"] = serde_json::Value::Array(transactions);
    }
    value
}

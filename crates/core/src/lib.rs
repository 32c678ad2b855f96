//! Core primitives for utxoshard.
//!
//! This crate provides the fundamental types used throughout the ledger:
//! - Double SHA-256 hashes
//! - The compact size codec and byte reader
//! - Transactions, inputs and outputs
//! - Blocks and block headers
//! - Merkle trees

pub mod block;
pub mod codec;
pub mod compact;
pub mod hash;
pub mod merkle;
pub mod transaction;

// Re-export commonly used types at the crate root
pub use block::{Block, BlockError, BlockHeader, MAINNET_GENESIS_HASH};
pub use codec::{DecodeError, Encode, Reader};
pub use compact::{compact_size_len, read_compact_size, write_compact_size};
pub use hash::{hash, hash_concat, Hash, Hasher, H256};
pub use merkle::{merkle_root, verify_proof, MerkleProof, MerkleTree, Side};
pub use transaction::{encode_witness, Transaction, TxIn, TxOut, WITNESS_MARKER};

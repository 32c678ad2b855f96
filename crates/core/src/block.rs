//! Block and block header structures.

use crate::codec::{DecodeError, Encode, Reader};
use crate::compact::{compact_size_len, write_compact_size};
use crate::hash::{hash, Hash};
use crate::merkle::merkle_root;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Display-order hash of the main-net genesis block.
pub const MAINNET_GENESIS_HASH: &str =
    "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";

fn display_hash(hash: &Option<Hash>) -> String {
    match hash {
        Some(hash) => hash.to_hex(),
        None => "unknown hash".to_string(),
    }
}

fn display_txid(txid: &Option<Hash>) -> String {
    match txid {
        Some(txid) => txid.to_hex(),
        None => "none".to_string(),
    }
}

/// Errors raised while building or decoding a block.
///
/// Every variant names the block height and, once the header is readable,
/// the blockhash.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("block {height} ({}): malformed header: {source}", display_hash(.blockhash))]
    Header {
        height: u32,
        blockhash: Option<Hash>,
        source: DecodeError,
    },

    #[error("block {height} ({blockhash}): malformed transaction #{index} at offset {offset} (last good txid {}): {source}", display_txid(.last_txid))]
    Transaction {
        height: u32,
        blockhash: Hash,
        index: usize,
        offset: usize,
        last_txid: Option<Hash>,
        source: DecodeError,
    },

    #[error("block {height} ({blockhash}): {source}")]
    Structure {
        height: u32,
        blockhash: Hash,
        source: DecodeError,
    },

    #[error("block {height} ({blockhash}): contains no transactions")]
    NoTransactions { height: u32, blockhash: Hash },

    #[error("block {height}: blockhash mismatch (expected {expected}, computed {computed})")]
    BlockhashMismatch {
        height: u32,
        expected: Hash,
        computed: Hash,
    },

    #[error("block {height} ({blockhash}): merkle root mismatch (header {header}, computed {computed})")]
    MerkleRootMismatch {
        height: u32,
        blockhash: Hash,
        header: Hash,
        computed: Hash,
    },
}

/// The fixed 80-byte block header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    /// Hash of the previous block.
    pub prev_blockhash: Hash,
    /// Merkle root of transaction ids.
    pub merkle_root: Hash,
    /// Unix timestamp in seconds.
    pub time: u32,
    /// Compact difficulty target.
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Serialized header size.
    pub const SIZE: usize = 80;

    /// Calculate the hash of this block header.
    pub fn hash(&self) -> Hash {
        hash(&self.to_bytes())
    }

    pub fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            version: reader.read_i32_le()?,
            prev_blockhash: reader.read_hash()?,
            merkle_root: reader.read_hash()?,
            time: reader.read_u32_le()?,
            bits: reader.read_u32_le()?,
            nonce: reader.read_u32_le()?,
        })
    }
}

impl Encode for BlockHeader {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(self.prev_blockhash.as_bytes());
        out.extend_from_slice(self.merkle_root.as_bytes());
        out.extend_from_slice(&self.time.to_le_bytes());
        out.extend_from_slice(&self.bits.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
    }

    fn encoded_len(&self) -> usize {
        Self::SIZE
    }
}

/// A complete, verified block.
///
/// Blocks can only be obtained through [`Block::new`], [`Block::assemble`]
/// or decoding, all of which verify the merkle root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<Transaction>,
    height: u32,
    hash: Hash,
}

impl Block {
    /// Create a block from a header and its transactions.
    ///
    /// Fails if there are no transactions or the merkle root of their txids
    /// differs from the header. The first transaction is flagged coinbase.
    pub fn new(
        header: BlockHeader,
        mut transactions: Vec<Transaction>,
        height: u32,
    ) -> Result<Self, BlockError> {
        let blockhash = header.hash();
        if transactions.is_empty() {
            return Err(BlockError::NoTransactions { height, blockhash });
        }

        for (index, tx) in transactions.iter_mut().enumerate() {
            tx.coinbase = index == 0;
        }

        let txids: Vec<Hash> = transactions.iter().map(Transaction::txid).collect();
        let computed = merkle_root(&txids);
        if computed != header.merkle_root {
            return Err(BlockError::MerkleRootMismatch {
                height,
                blockhash,
                header: header.merkle_root,
                computed,
            });
        }

        Ok(Self {
            header,
            transactions,
            height,
            hash: blockhash,
        })
    }

    /// Create a block, filling the header's merkle root from the transactions.
    pub fn assemble(
        version: i32,
        prev_blockhash: Hash,
        time: u32,
        bits: u32,
        nonce: u32,
        transactions: Vec<Transaction>,
        height: u32,
    ) -> Result<Self, BlockError> {
        let txids: Vec<Hash> = transactions.iter().map(Transaction::txid).collect();
        let header = BlockHeader {
            version,
            prev_blockhash,
            merkle_root: merkle_root(&txids),
            time,
            bits,
            nonce,
        };
        Self::new(header, transactions, height)
    }

    /// Decode a block that occupies the whole buffer.
    pub fn decode(
        bytes: &[u8],
        height: u32,
        expected_hash: Option<Hash>,
    ) -> Result<Self, BlockError> {
        let (block, consumed) = Self::decode_at(bytes, 0, height, expected_hash)?;
        if consumed != bytes.len() {
            return Err(BlockError::Structure {
                height,
                blockhash: block.hash,
                source: DecodeError::TrailingBytes {
                    offset: consumed,
                    count: bytes.len() - consumed,
                },
            });
        }
        Ok(block)
    }

    /// Decode a block starting at `offset`, returning it with the number of
    /// bytes consumed.
    pub fn decode_at(
        bytes: &[u8],
        offset: usize,
        height: u32,
        expected_hash: Option<Hash>,
    ) -> Result<(Self, usize), BlockError> {
        let mut reader = Reader::at(bytes, offset);
        let header = BlockHeader::decode(&mut reader).map_err(|source| BlockError::Header {
            height,
            blockhash: expected_hash,
            source,
        })?;
        let blockhash = header.hash();

        let tx_count = reader.read_len().map_err(|source| BlockError::Structure {
            height,
            blockhash,
            source,
        })?;

        let mut transactions = Vec::with_capacity(tx_count);
        let mut last_txid = None;
        for index in 0..tx_count {
            let tx_offset = reader.position();
            let tx = Transaction::decode(&mut reader).map_err(|source| {
                BlockError::Transaction {
                    height,
                    blockhash,
                    index,
                    offset: tx_offset,
                    last_txid,
                    source,
                }
            })?;
            last_txid = Some(tx.txid());
            transactions.push(tx);
        }

        if let Some(expected) = expected_hash {
            if expected != blockhash {
                return Err(BlockError::BlockhashMismatch {
                    height,
                    expected,
                    computed: blockhash,
                });
            }
        }

        let block = Self::new(header, transactions, height)?;
        let consumed = reader.position() - offset;
        if consumed != block.encoded_len() {
            return Err(BlockError::Structure {
                height,
                blockhash,
                source: DecodeError::SizeMismatch {
                    offset,
                    consumed,
                    computed: block.encoded_len(),
                },
            });
        }
        Ok((block, consumed))
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Get the block height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get the block hash (hash of the header).
    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn prev_blockhash(&self) -> Hash {
        self.header.prev_blockhash
    }

    pub fn coinbase(&self) -> &Transaction {
        &self.transactions[0]
    }

    /// Get the number of transactions in this block.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Recompute the merkle root from the transactions.
    pub fn compute_merkle_root(&self) -> Hash {
        let txids: Vec<Hash> = self.transactions.iter().map(Transaction::txid).collect();
        merkle_root(&txids)
    }
}

impl Encode for Block {
    fn encode_to(&self, out: &mut Vec<u8>) {
        self.header.encode_to(out);
        write_compact_size(out, self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.encode_to(out);
        }
    }

    fn encoded_len(&self) -> usize {
        BlockHeader::SIZE
            + compact_size_len(self.transactions.len() as u64)
            + self
                .transactions
                .iter()
                .map(Encode::encoded_len)
                .sum::<usize>()
    }
}

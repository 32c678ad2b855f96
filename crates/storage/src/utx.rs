//! Ledger entries (UTX) and spend records (STX).
//!
//! A [`Utx`] aggregates the still-unspent outputs of one transaction. A
//! [`Stx`] groups the inputs of one block that spend outputs of the same
//! previous transaction.

use crate::error::LedgerError;
use std::collections::BTreeMap;
use utxoshard_core::codec::{var_bytes_len, write_var_bytes};
use utxoshard_core::{
    compact_size_len, write_compact_size, DecodeError, Encode, Hash, Reader, Transaction, TxIn,
    TxOut,
};

const FLAG_COINBASE: u8 = 0x01;

/// Outcome of spending one output of a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Spent {
    /// Outputs remain; the entry stays in its shard.
    Remaining(TxOut),
    /// That was the last output; the entry must be removed.
    Emptied(TxOut),
}

impl Spent {
    pub fn output(&self) -> &TxOut {
        match self {
            Spent::Remaining(output) | Spent::Emptied(output) => output,
        }
    }

    pub fn is_emptied(&self) -> bool {
        matches!(self, Spent::Emptied(_))
    }
}

/// The unspent outputs of one transaction, keyed by original output index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utx {
    txid: Hash,
    height: u32,
    coinbase: bool,
    outputs: BTreeMap<u32, TxOut>,
}

impl Utx {
    pub fn new(txid: Hash, height: u32, coinbase: bool, outputs: BTreeMap<u32, TxOut>) -> Self {
        Self {
            txid,
            height,
            coinbase,
            outputs,
        }
    }

    /// Every output of `tx`, created at `height`.
    pub fn from_transaction(tx: &Transaction, height: u32) -> Self {
        let outputs = tx
            .outputs()
            .iter()
            .enumerate()
            .map(|(index, output)| (index as u32, output.clone()))
            .collect();
        Self::new(tx.txid(), height, tx.is_coinbase(), outputs)
    }

    pub fn txid(&self) -> Hash {
        self.txid
    }

    /// Height of the block that created the transaction.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_coinbase(&self) -> bool {
        self.coinbase
    }

    pub fn outputs(&self) -> &BTreeMap<u32, TxOut> {
        &self.outputs
    }

    pub fn output(&self, index: u32) -> Option<&TxOut> {
        self.outputs.get(&index)
    }

    pub fn contains(&self, index: u32) -> bool {
        self.outputs.contains_key(&index)
    }

    /// Number of unspent outputs.
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Sum of unspent output values.
    pub fn value(&self) -> i128 {
        self.outputs.values().map(|o| i128::from(o.value)).sum()
    }

    /// Remove output `index`.
    pub fn spend(&mut self, index: u32) -> Result<Spent, LedgerError> {
        let output = self
            .outputs
            .remove(&index)
            .ok_or(LedgerError::OutputNotFound {
                txid: self.txid,
                index,
            })?;
        if self.outputs.is_empty() {
            Ok(Spent::Emptied(output))
        } else {
            Ok(Spent::Remaining(output))
        }
    }

    // =========================================================================
    // Protocol form
    // =========================================================================

    /// `txid | height(4) | flags(1) | count | { index(4) | value(8) | script }*`
    pub fn encode_protocol(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.txid.as_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.push(if self.coinbase { FLAG_COINBASE } else { 0 });
        write_compact_size(out, self.outputs.len() as u64);
        for (index, output) in &self.outputs {
            out.extend_from_slice(&index.to_le_bytes());
            output.encode_to(out);
        }
    }

    pub fn protocol_size(&self) -> usize {
        Hash::LEN
            + 4
            + 1
            + compact_size_len(self.outputs.len() as u64)
            + self
                .outputs
                .values()
                .map(|output| 4 + output.encoded_len())
                .sum::<usize>()
    }

    pub fn decode_protocol(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let txid = reader.read_hash()?;
        let height = reader.read_u32_le()?;
        let flags_offset = reader.position();
        let coinbase = match reader.read_u8()? {
            0 => false,
            FLAG_COINBASE => true,
            _ => {
                return Err(DecodeError::Invalid {
                    offset: flags_offset,
                    reason: "unknown ledger entry flags",
                })
            }
        };
        let count = read_output_count(reader)?;

        let mut outputs = BTreeMap::new();
        let mut previous: Option<u32> = None;
        for _ in 0..count {
            let offset = reader.position();
            let index = reader.read_u32_le()?;
            check_ascending(previous, index, offset)?;
            previous = Some(index);
            outputs.insert(index, TxOut::decode(reader)?);
        }
        Ok(Self::new(txid, height, coinbase, outputs))
    }

    // =========================================================================
    // Storage form
    // =========================================================================

    /// `txid | (height << 1 | coinbase) | count | { index gap | value | script }*`
    ///
    /// All integers except the txid are compact sizes; output indices are
    /// stored as the gap from the previous index plus one.
    pub fn encode_storage(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.txid.as_bytes());
        write_compact_size(out, self.packed_height());
        write_compact_size(out, self.outputs.len() as u64);
        let mut next = 0u64;
        for (&index, output) in &self.outputs {
            write_compact_size(out, u64::from(index) - next);
            write_compact_size(out, output.value as u64);
            write_var_bytes(out, &output.script_pubkey);
            next = u64::from(index) + 1;
        }
    }

    pub fn storage_size(&self) -> usize {
        let mut size = Hash::LEN
            + compact_size_len(self.packed_height())
            + compact_size_len(self.outputs.len() as u64);
        let mut next = 0u64;
        for (&index, output) in &self.outputs {
            size += compact_size_len(u64::from(index) - next)
                + compact_size_len(output.value as u64)
                + var_bytes_len(&output.script_pubkey);
            next = u64::from(index) + 1;
        }
        size
    }

    pub fn decode_storage(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let txid = reader.read_hash()?;
        let packed_offset = reader.position();
        let packed = reader.read_compact_size()?;
        let height = u32::try_from(packed >> 1).map_err(|_| DecodeError::Invalid {
            offset: packed_offset,
            reason: "ledger entry height out of range",
        })?;
        let coinbase = packed & 1 == 1;
        let count = read_output_count(reader)?;

        let mut outputs = BTreeMap::new();
        let mut next = 0u64;
        for _ in 0..count {
            let offset = reader.position();
            let index = next
                .checked_add(reader.read_compact_size()?)
                .and_then(|index| u32::try_from(index).ok())
                .ok_or(DecodeError::Invalid {
                    offset,
                    reason: "output index out of range",
                })?;
            let value = reader.read_compact_size()? as i64;
            let script_pubkey = reader.read_var_bytes()?;
            outputs.insert(index, TxOut::new(value, script_pubkey));
            next = u64::from(index) + 1;
        }
        Ok(Self::new(txid, height, coinbase, outputs))
    }

    fn packed_height(&self) -> u64 {
        (u64::from(self.height) << 1) | u64::from(self.coinbase)
    }
}

fn read_output_count(reader: &mut Reader<'_>) -> Result<usize, DecodeError> {
    let offset = reader.position();
    let count = reader.read_len()?;
    if count == 0 {
        return Err(DecodeError::Invalid {
            offset,
            reason: "ledger entry without outputs",
        });
    }
    Ok(count)
}

fn check_ascending(previous: Option<u32>, index: u32, offset: usize) -> Result<(), DecodeError> {
    match previous {
        Some(previous) if index <= previous => Err(DecodeError::Invalid {
            offset,
            reason: "output indices not strictly ascending",
        }),
        _ => Ok(()),
    }
}

/// Inputs of one block that spend outputs of transaction `txid`.
///
/// Inputs are keyed only by the spent output index; two inputs spending the
/// same index are the same spend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stx {
    txid: Hash,
    inputs: BTreeMap<u32, TxIn>,
}

impl Stx {
    pub fn new(txid: Hash) -> Self {
        Self {
            txid,
            inputs: BTreeMap::new(),
        }
    }

    /// The transaction whose outputs are spent.
    pub fn txid(&self) -> Hash {
        self.txid
    }

    /// Record `input`. Returns false if its output index is already spent
    /// by this record.
    pub fn add(&mut self, input: TxIn) -> bool {
        debug_assert_eq!(input.prev_txid, self.txid);
        if self.inputs.contains_key(&input.prev_index) {
            return false;
        }
        self.inputs.insert(input.prev_index, input);
        true
    }

    /// Spent output indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.inputs.keys().copied()
    }

    pub fn inputs(&self) -> impl Iterator<Item = &TxIn> {
        self.inputs.values()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

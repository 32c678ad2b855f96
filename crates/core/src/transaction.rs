//! Transactions, inputs and outputs in their wire layout.

use crate::codec::{var_bytes_len, write_var_bytes, DecodeError, Encode, Reader, Result};
use crate::compact::{compact_size_len, write_compact_size};
use crate::hash::{Hash, Hasher};
use serde::{Deserialize, Serialize};

/// Two bytes following the version field that announce witness data.
pub const WITNESS_MARKER: [u8; 2] = [0x00, 0x01];

/// A transaction input: a reference to a previous output plus unlocking data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    /// Txid of the transaction whose output is spent.
    pub prev_txid: Hash,
    /// Index of the spent output within that transaction.
    pub prev_index: u32,
    /// Unlocking script (opaque).
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl TxIn {
    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            prev_txid: reader.read_hash()?,
            prev_index: reader.read_u32_le()?,
            script_sig: reader.read_var_bytes()?,
            sequence: reader.read_u32_le()?,
        })
    }
}

impl Encode for TxIn {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.prev_txid.as_bytes());
        out.extend_from_slice(&self.prev_index.to_le_bytes());
        write_var_bytes(out, &self.script_sig);
        out.extend_from_slice(&self.sequence.to_le_bytes());
    }

    fn encoded_len(&self) -> usize {
        Hash::LEN + 4 + var_bytes_len(&self.script_sig) + 4
    }
}

/// A transaction output: an amount and its locking script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: i64,
    /// Locking script (opaque).
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    pub fn new(value: i64, script_pubkey: Vec<u8>) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }

    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            value: reader.read_i64_le()?,
            script_pubkey: reader.read_var_bytes()?,
        })
    }
}

impl Encode for TxOut {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        write_var_bytes(out, &self.script_pubkey);
    }

    fn encoded_len(&self) -> usize {
        8 + var_bytes_len(&self.script_pubkey)
    }
}

/// A decoded transaction.
///
/// The txid is derived when the value is built and cannot be changed
/// afterwards. The coinbase flag is assigned by the owning block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    version: i32,
    inputs: Vec<TxIn>,
    outputs: Vec<TxOut>,
    /// Raw witness section, kept verbatim.
    witness: Option<Vec<u8>>,
    lock_time: u32,
    txid: Hash,
    pub(crate) coinbase: bool,
}

impl Transaction {
    /// Build a transaction and derive its txid.
    ///
    /// `witness` is the raw witness section (see [`encode_witness`]); it is
    /// excluded from the txid.
    pub fn new(
        version: i32,
        inputs: Vec<TxIn>,
        outputs: Vec<TxOut>,
        witness: Option<Vec<u8>>,
        lock_time: u32,
    ) -> Self {
        let mut tx = Self {
            version,
            inputs,
            outputs,
            witness,
            lock_time,
            txid: Hash::ZERO,
            coinbase: false,
        };
        tx.txid = tx.compute_txid();
        tx
    }

    /// Decode one transaction starting at the reader's position.
    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let start = reader.position();
        let version = reader.read_i32_le()?;

        let has_witness = reader.peek(2) == Some(&WITNESS_MARKER[..]);
        if has_witness {
            reader.skip(2)?;
        }

        let input_count = reader.read_len()?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(TxIn::decode(reader)?);
        }

        let output_count = reader.read_len()?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(TxOut::decode(reader)?);
        }

        let witness = if has_witness {
            Some(read_witness(reader, input_count)?)
        } else {
            None
        };
        let lock_time = reader.read_u32_le()?;

        let tx = Self::new(version, inputs, outputs, witness, lock_time);
        let consumed = reader.position() - start;
        if consumed != tx.encoded_len() {
            return Err(DecodeError::SizeMismatch {
                offset: start,
                consumed,
                computed: tx.encoded_len(),
            });
        }
        Ok(tx)
    }

    pub fn txid(&self) -> Hash {
        self.txid
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn inputs(&self) -> &[TxIn] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOut] {
        &self.outputs
    }

    pub fn witness(&self) -> Option<&[u8]> {
        self.witness.as_deref()
    }

    pub fn has_witness(&self) -> bool {
        self.witness.is_some()
    }

    pub fn lock_time(&self) -> u32 {
        self.lock_time
    }

    /// True for the first transaction of a block.
    pub fn is_coinbase(&self) -> bool {
        self.coinbase
    }

    /// Size of the serialization without marker and witness.
    pub fn base_size(&self) -> usize {
        4 + compact_size_len(self.inputs.len() as u64)
            + self.inputs.iter().map(Encode::encoded_len).sum::<usize>()
            + compact_size_len(self.outputs.len() as u64)
            + self.outputs.iter().map(Encode::encoded_len).sum::<usize>()
            + 4
    }

    /// Hash of the full serialization including witness data.
    pub fn wtxid(&self) -> Hash {
        let mut hasher = Hasher::new();
        hasher.update(&self.to_bytes());
        hasher.finalize()
    }

    fn encode_base_body(&self, out: &mut Vec<u8>) {
        write_compact_size(out, self.inputs.len() as u64);
        for input in &self.inputs {
            input.encode_to(out);
        }
        write_compact_size(out, self.outputs.len() as u64);
        for output in &self.outputs {
            output.encode_to(out);
        }
    }

    fn compute_txid(&self) -> Hash {
        let mut base = Vec::with_capacity(self.base_size());
        base.extend_from_slice(&self.version.to_le_bytes());
        self.encode_base_body(&mut base);
        base.extend_from_slice(&self.lock_time.to_le_bytes());

        let mut hasher = Hasher::new();
        hasher.update(&base);
        hasher.finalize()
    }
}

impl Encode for Transaction {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        if self.witness.is_some() {
            out.extend_from_slice(&WITNESS_MARKER);
        }
        self.encode_base_body(out);
        if let Some(witness) = &self.witness {
            out.extend_from_slice(witness);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
    }

    fn encoded_len(&self) -> usize {
        match &self.witness {
            Some(witness) => self.base_size() + WITNESS_MARKER.len() + witness.len(),
            None => self.base_size(),
        }
    }
}

/// Locate the witness section by walking one stack per input, then copy it.
fn read_witness(reader: &mut Reader<'_>, input_count: usize) -> Result<Vec<u8>> {
    let mut scan = reader.clone();
    let start = scan.position();
    for _ in 0..input_count {
        let items = scan.read_len()?;
        for _ in 0..items {
            let len = scan.read_len()?;
            scan.skip(len)?;
        }
    }
    let len = scan.position() - start;
    Ok(reader.take(len)?.to_vec())
}

/// Serialize per-input witness stacks into a raw witness section.
pub fn encode_witness(stacks: &[Vec<Vec<u8>>]) -> Vec<u8> {
    let mut out = Vec::new();
    for stack in stacks {
        write_compact_size(&mut out, stack.len() as u64);
        for item in stack {
            write_var_bytes(&mut out, item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash;

    fn sample_input(index: u32) -> TxIn {
        TxIn {
            prev_txid: hash(b"previous"),
            prev_index: index,
            script_sig: vec![0x51, 0x52],
            sequence: 0xFFFF_FFFF,
        }
    }

    fn legacy_tx() -> Transaction {
        Transaction::new(
            1,
            vec![sample_input(0), sample_input(3)],
            vec![TxOut::new(50_000, vec![0x76, 0xA9]), TxOut::new(1, vec![])],
            None,
            0,
        )
    }

    fn witness_tx() -> Transaction {
        let witness = encode_witness(&[vec![vec![0xAA; 72], vec![0xBB; 33]], vec![]]);
        Transaction::new(
            2,
            vec![sample_input(0), sample_input(1)],
            vec![TxOut::new(12_345, vec![0x00, 0x14])],
            Some(witness),
            500_000,
        )
    }

    #[test]
    fn test_input_layout() {
        let input = sample_input(7);
        let bytes = input.to_bytes();
        assert_eq!(bytes.len(), input.encoded_len());
        assert_eq!(&bytes[32..36], &7u32.to_le_bytes());
        assert_eq!(bytes[36], 2);
    }

    #[test]
    fn test_output_layout() {
        let output = TxOut::new(-1, vec![0x6A]);
        let bytes = output.to_bytes();
        let mut expected = vec![0xFFu8; 8];
        expected.extend_from_slice(&[1, 0x6A]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_legacy_decode() {
        let tx = legacy_tx();
        let bytes = tx.to_bytes();
        let mut reader = Reader::new(&bytes);
        let decoded = Transaction::decode(&mut reader).unwrap();
        assert!(reader.is_empty());
        assert_eq!(decoded, tx);
        assert!(!decoded.has_witness());
        assert_eq!(decoded.txid(), hash(&bytes));
        assert_eq!(decoded.txid(), decoded.wtxid());
    }

    #[test]
    fn test_witness_decode() {
        let tx = witness_tx();
        let bytes = tx.to_bytes();
        assert_eq!(&bytes[4..6], &WITNESS_MARKER);

        let mut reader = Reader::new(&bytes);
        let decoded = Transaction::decode(&mut reader).unwrap();
        assert!(reader.is_empty());
        assert_eq!(decoded, tx);
        assert_eq!(decoded.witness(), tx.witness());
    }

    #[test]
    fn test_txid_excludes_witness() {
        let with_witness = witness_tx();
        let stripped = Transaction::new(
            with_witness.version(),
            with_witness.inputs().to_vec(),
            with_witness.outputs().to_vec(),
            None,
            with_witness.lock_time(),
        );
        assert_eq!(with_witness.txid(), stripped.txid());
        assert_ne!(with_witness.wtxid(), stripped.wtxid());
        assert_eq!(with_witness.base_size(), stripped.encoded_len());
    }

    #[test]
    fn test_decode_at_offset() {
        let tx = legacy_tx();
        let mut buf = vec![0xEE; 5];
        buf.extend_from_slice(&tx.to_bytes());
        let mut reader = Reader::at(&buf, 5);
        assert_eq!(Transaction::decode(&mut reader).unwrap().txid(), tx.txid());
    }

    #[test]
    fn test_truncated_transaction() {
        let bytes = legacy_tx().to_bytes();
        let mut reader = Reader::new(&bytes[..bytes.len() - 2]);
        assert!(matches!(
            Transaction::decode(&mut reader),
            Err(DecodeError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_truncated_witness() {
        let bytes = witness_tx().to_bytes();
        // Drop the lock time and cut into the last witness item.
        let mut reader = Reader::new(&bytes[..bytes.len() - 14]);
        assert!(Transaction::decode(&mut reader).is_err());
    }

    #[test]
    fn test_new_transaction_is_not_coinbase() {
        assert!(!legacy_tx().is_coinbase());
    }
}

//! Byte-level reading and writing for the wire and storage layouts.
//!
//! All fixed-width integers are little-endian. Variable-length fields are
//! prefixed with a compact size (see [`crate::compact`]).

use crate::compact::{compact_size_len, read_compact_size, write_compact_size};
use crate::hash::Hash;
use thiserror::Error;

/// Structural decoding errors. Offsets are absolute positions in the buffer
/// handed to the [`Reader`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {offset} (needed {needed} bytes, {available} available)")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("non-canonical compact size {value} at offset {offset}")]
    NonCanonicalSize { offset: usize, value: u64 },

    #[error("length {len} at offset {offset} exceeds the remaining input")]
    LengthOverflow { offset: usize, len: u64 },

    #[error("serialized size mismatch at offset {offset}: consumed {consumed} bytes, computed {computed}")]
    SizeMismatch {
        offset: usize,
        consumed: usize,
        computed: usize,
    },

    #[error("{count} trailing bytes at offset {offset}")]
    TrailingBytes { offset: usize, count: usize },

    #[error("invalid data at offset {offset}: {reason}")]
    Invalid { offset: usize, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Sequential reader over a borrowed byte buffer.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Start reading at `offset` (offsets in errors stay absolute).
    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        Self { buf, pos: offset }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The whole underlying buffer.
    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    /// Borrow the next `n` bytes and advance.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEof {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Look at the next `n` bytes without consuming them.
    pub fn peek(&self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n {
            None
        } else {
            Some(&self.buf[self.pos..self.pos + n])
        }
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn read_i64_le(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub fn read_hash(&mut self) -> Result<Hash> {
        Ok(Hash(self.array()?))
    }

    pub fn read_compact_size(&mut self) -> Result<u64> {
        read_compact_size(self)
    }

    /// Read a compact size used as an element count or byte length.
    ///
    /// Every counted element occupies at least one byte, so a value larger
    /// than the remaining input is rejected before anything is allocated.
    pub fn read_len(&mut self) -> Result<usize> {
        let offset = self.pos;
        let len = self.read_compact_size()?;
        if len > self.remaining() as u64 {
            return Err(DecodeError::LengthOverflow { offset, len });
        }
        Ok(len as usize)
    }

    /// Read a compact-size-prefixed byte string.
    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_len()?;
        Ok(self.take(len)?.to_vec())
    }

    /// Fail unless every byte of the buffer has been consumed.
    pub fn finish(&self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            count => Err(DecodeError::TrailingBytes {
                offset: self.pos,
                count,
            }),
        }
    }
}

/// Types with a canonical byte layout.
pub trait Encode {
    /// Append the encoding to `out`.
    fn encode_to(&self, out: &mut Vec<u8>);

    /// Exact number of bytes [`Encode::encode_to`] appends.
    fn encoded_len(&self) -> usize;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_to(&mut out);
        out
    }
}

/// Append a compact-size-prefixed byte string.
pub fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// Encoded length of a compact-size-prefixed byte string.
pub fn var_bytes_len(bytes: &[u8]) -> usize {
    compact_size_len(bytes.len() as u64) + bytes.len()
}

//! Compact size: the self-describing variable-length unsigned integer.
//!
//! | value range        | encoding                |
//! |--------------------|-------------------------|
//! | `< 0xFD`           | 1 byte                  |
//! | `< 0x1_0000`       | `0xFD` + 2 bytes LE     |
//! | `< 0x1_0000_0000`  | `0xFE` + 4 bytes LE     |
//! | otherwise          | `0xFF` + 8 bytes LE     |

use crate::codec::{DecodeError, Reader};

const TAG_U16: u8 = 0xFD;
const TAG_U32: u8 = 0xFE;
const TAG_U64: u8 = 0xFF;

/// Number of bytes `value` occupies when encoded.
pub fn compact_size_len(value: u64) -> usize {
    match value {
        0..=0xFC => 1,
        0xFD..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}

/// Append the encoding of `value` to `out`.
pub fn write_compact_size(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xFC => out.push(value as u8),
        0xFD..=0xFFFF => {
            out.push(TAG_U16);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            out.push(TAG_U32);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(TAG_U64);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Read one compact size from `reader`.
///
/// Encodings that use more bytes than the value needs are rejected, so the
/// re-encoded length of a decoded value always equals the bytes consumed.
pub fn read_compact_size(reader: &mut Reader<'_>) -> Result<u64, DecodeError> {
    let offset = reader.position();
    let tag = reader.read_u8()?;
    let value = match tag {
        TAG_U16 => u64::from(reader.read_u16_le()?),
        TAG_U32 => u64::from(reader.read_u32_le()?),
        TAG_U64 => reader.read_u64_le()?,
        small => return Ok(u64::from(small)),
    };
    if compact_size_len(value) != reader.position() - offset {
        return Err(DecodeError::NonCanonicalSize { offset, value });
    }
    Ok(value)
}

//! LEB128 primitives shared by every variable-length structure in a dex
//! image. All decoders are bounds-checked and reject encodings longer than
//! the five bytes a 32-bit value may occupy.

use std::fmt;

use crate::{dex_err, error::DexError, Result};

/// Largest number of bytes a LEB128-encoded `u32` may span.
const MAX_LEB128_WIDTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIntErrorKind {
    /// The input ended before a byte without the continuation bit was seen.
    NotEnoughBytes,
    /// The encoding continues past the five bytes a 32-bit value may use.
    Overflow,
}

impl fmt::Display for VarIntErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarIntErrorKind::NotEnoughBytes => write!(f, "not enough bytes"),
            VarIntErrorKind::Overflow => write!(f, "value overflows 32 bits"),
        }
    }
}

impl std::error::Error for VarIntErrorKind {}

/// Decodes a ULEB128 value, returning it together with its encoded size.
pub fn decode_leb128(data: &[u8]) -> Result<(u32, usize)> {
    let mut result: u32 = 0;
    let mut count = 0usize;
    loop {
        if count >= data.len() {
            return dex_err!(VarIntError, VarIntErrorKind::NotEnoughBytes);
        }
        if count == MAX_LEB128_WIDTH {
            return dex_err!(VarIntError, VarIntErrorKind::Overflow);
        }
        let byte = data[count];
        result |= ((byte & 0x7F) as u32) << (7 * count);
        count += 1;
        if byte & 0x80 == 0 {
            break;
        }
    }
    Ok((result, count))
}

/// Decodes a ULEB128 value at `data[*pos..]` and advances the cursor.
pub fn decode_leb128_off(data: &[u8], pos: &mut usize) -> Result<u32> {
    let (value, size) = decode_leb128(&data[(*pos).min(data.len())..])?;
    *pos += size;
    Ok(value)
}

/// Decodes a SLEB128 value, returning it together with its encoded size.
pub fn decode_sleb128(data: &[u8]) -> Result<(i32, usize)> {
    let mut result: i32 = 0;
    let mut shift = 0u32;
    let mut count = 0usize;
    loop {
        if count >= data.len() {
            return dex_err!(VarIntError, VarIntErrorKind::NotEnoughBytes);
        }
        if count == MAX_LEB128_WIDTH {
            return dex_err!(VarIntError, VarIntErrorKind::Overflow);
        }
        let byte = data[count];
        count += 1;
        result |= (((byte & 0x7F) as u32) << shift) as i32;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 32 && (byte & 0x40) != 0 {
                result |= ((!0u32) << shift) as i32;
            }
            break;
        }
    }
    Ok((result, count))
}

/// Decodes a SLEB128 value at `data[*pos..]` and advances the cursor.
pub fn decode_sleb128_off(data: &[u8], pos: &mut usize) -> Result<i32> {
    let (value, size) = decode_sleb128(&data[(*pos).min(data.len())..])?;
    *pos += size;
    Ok(value)
}

/// Decodes a ULEB128p1 value: the encoded value minus one. An encoded zero
/// yields `0xFFFF_FFFF`, the "no index" sentinel.
pub fn decode_leb128p1(data: &[u8]) -> Result<(u32, usize)> {
    let (value, size) = decode_leb128(data)?;
    Ok((value.wrapping_sub(1), size))
}

/// Decodes a ULEB128p1 value at `data[*pos..]` and advances the cursor.
pub fn decode_leb128p1_off(data: &[u8], pos: &mut usize) -> Result<u32> {
    let (value, size) = decode_leb128p1(&data[(*pos).min(data.len())..])?;
    *pos += size;
    Ok(value)
}

//! Zigzag varints.
//!
//! Signed values are zigzag-mapped so small magnitudes of either sign stay
//! short, then written seven bits at a time, low group first.

use bytes::BufMut;

use crate::error::{FrameError, Result};

/// Longest encoding of a 64-bit value.
pub const MAX_VARINT_LEN: usize = 10;

/// Append the encoding of `value` to `dst`.
pub fn put_zigzag(dst: &mut impl BufMut, value: i64) {
    let mut n = ((value << 1) ^ (value >> 63)) as u64;
    while n >= 0x80 {
        dst.put_u8((n as u8) | 0x80);
        n >>= 7;
    }
    dst.put_u8(n as u8);
}

/// Decode a value that must span the whole of `src`.
pub fn decode_zigzag(src: &[u8]) -> Result<i64> {
    let mut n: u64 = 0;
    for (i, &byte) in src.iter().enumerate() {
        if i == MAX_VARINT_LEN || (i == MAX_VARINT_LEN - 1 && byte > 1) {
            return Err(FrameError::InvalidVarint);
        }
        n |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            if i + 1 != src.len() {
                return Err(FrameError::InvalidVarint);
            }
            return Ok(((n >> 1) as i64) ^ -((n & 1) as i64));
        }
    }
    Err(FrameError::InvalidVarint)
}

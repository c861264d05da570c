//! Unsigned LEB128 varint encoding.
//!
//! Little-endian base-128 with continuation bits. Encodings longer than 10
//! bytes (more than fit a `u64`) are rejected as overlong.

use crate::error::{Result, SerialError};

/// Maximum number of bytes a canonical `u64` varint may occupy.
pub const MAX_VARINT_LEN: usize = 10;

/// Append the varint encoding of `value` to `out`.
pub fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

/// Decode a varint from the front of `input`.
///
/// Returns the decoded value and the number of bytes consumed.
pub fn decode_varint(input: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    for (i, &byte) in input.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err(SerialError::OverlongVarint);
        }
        let payload = (byte & 0x7f) as u64;
        if shift >= 64 || (shift == 63 && payload > 1) {
            return Err(SerialError::OverlongVarint);
        }
        value |= payload << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    Err(SerialError::TruncatedInput { needed: 1 })
}

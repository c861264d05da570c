//! The 14-tag TLV value taxonomy.

use std::collections::BTreeMap;

use crate::error::{Result, SerialError};
use crate::varint::{decode_varint, encode_varint};

const TAG_NULL: u8 = 0x00;
const TAG_FALSE: u8 = 0x01;
const TAG_TRUE: u8 = 0x02;
const TAG_U8: u8 = 0x10;
const TAG_I8: u8 = 0x11;
const TAG_U16: u8 = 0x12;
const TAG_I16: u8 = 0x13;
const TAG_U32: u8 = 0x14;
const TAG_I32: u8 = 0x15;
const TAG_U64: u8 = 0x16;
const TAG_I64: u8 = 0x17;
const TAG_F32: u8 = 0x20;
const TAG_F64: u8 = 0x21;
const TAG_BYTES: u8 = 0x30;
const TAG_TEXT: u8 = 0x31;
const TAG_SEQ: u8 = 0x40;
const TAG_MAP: u8 = 0x41;

/// An in-memory value of the closed 14-tag taxonomy used for frame metadata,
/// associated-data maps, and handshake message bodies.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The `null` tag.
    Null,
    /// A boolean, encoded as one of two distinct tags rather than a payload byte.
    Bool(bool),
    /// An unsigned 8-bit integer.
    U8(u8),
    /// A signed 8-bit integer.
    I8(i8),
    /// An unsigned 16-bit integer, big-endian on the wire.
    U16(u16),
    /// A signed 16-bit integer, big-endian on the wire.
    I16(i16),
    /// An unsigned 32-bit integer, big-endian on the wire.
    U32(u32),
    /// A signed 32-bit integer, big-endian on the wire.
    I32(i32),
    /// An unsigned 64-bit integer, big-endian on the wire.
    U64(u64),
    /// A signed 64-bit integer, big-endian on the wire.
    I64(i64),
    /// An IEEE-754 single-precision float, big-endian on the wire.
    F32(f32),
    /// An IEEE-754 double-precision float, big-endian on the wire.
    F64(f64),
    /// A length-prefixed opaque byte string.
    Bytes(Vec<u8>),
    /// A length-prefixed UTF-8 text string.
    Text(String),
    /// An ordered sequence of values.
    Seq(Vec<Value>),
    /// A map from text keys to values, canonically ordered on the wire.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build the smallest-fitting unsigned integer value for `n`.
    #[must_use]
    pub fn from_u64_fitting(n: u64) -> Value {
        if let Ok(v) = u8::try_from(n) {
            Value::U8(v)
        } else if let Ok(v) = u16::try_from(n) {
            Value::U16(v)
        } else if let Ok(v) = u32::try_from(n) {
            Value::U32(v)
        } else {
            Value::U64(n)
        }
    }

    /// Build the smallest-fitting signed integer value for `n`.
    #[must_use]
    pub fn from_i64_fitting(n: i64) -> Value {
        if let Ok(v) = i8::try_from(n) {
            Value::I8(v)
        } else if let Ok(v) = i16::try_from(n) {
            Value::I16(v)
        } else if let Ok(v) = i32::try_from(n) {
            Value::I32(v)
        } else {
            Value::I64(n)
        }
    }

    /// Encode this value into `out`, appending its TLV representation.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Value::Null => out.push(TAG_NULL),
            Value::Bool(false) => out.push(TAG_FALSE),
            Value::Bool(true) => out.push(TAG_TRUE),
            Value::U8(v) => {
                out.push(TAG_U8);
                out.push(*v);
            }
            Value::I8(v) => {
                out.push(TAG_I8);
                out.push(*v as u8);
            }
            Value::U16(v) => {
                out.push(TAG_U16);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Value::I16(v) => {
                out.push(TAG_I16);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Value::U32(v) => {
                out.push(TAG_U32);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Value::I32(v) => {
                out.push(TAG_I32);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Value::U64(v) => {
                out.push(TAG_U64);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Value::I64(v) => {
                out.push(TAG_I64);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Value::F32(v) => {
                out.push(TAG_F32);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Value::F64(v) => {
                out.push(TAG_F64);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Value::Bytes(b) => {
                out.push(TAG_BYTES);
                encode_varint(b.len() as u64, out);
                out.extend_from_slice(b);
            }
            Value::Text(s) => {
                out.push(TAG_TEXT);
                encode_varint(s.len() as u64, out);
                out.extend_from_slice(s.as_bytes());
            }
            Value::Seq(items) => {
                out.push(TAG_SEQ);
                encode_varint(items.len() as u64, out);
                for item in items {
                    item.encode(out);
                }
            }
            Value::Map(map) => {
                out.push(TAG_MAP);
                encode_varint(map.len() as u64, out);
                // BTreeMap<String, _> iterates in ascending key order, and
                // Rust's `Ord` on `String` agrees with byte-lexicographic
                // order for valid UTF-8, so this is already canonical.
                for (key, value) in map {
                    encode_varint(key.len() as u64, out);
                    out.extend_from_slice(key.as_bytes());
                    value.encode(out);
                }
            }
        }
    }

    /// Encode this value into a fresh byte vector.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }

    /// Decode a value from the front of `input`.
    ///
    /// Returns the decoded value and the number of bytes consumed.
    pub fn decode(input: &[u8]) -> Result<(Value, usize)> {
        let tag = *input
            .first()
            .ok_or(SerialError::TruncatedInput { needed: 1 })?;
        let mut pos = 1;
        let value = match tag {
            TAG_NULL => Value::Null,
            TAG_FALSE => Value::Bool(false),
            TAG_TRUE => Value::Bool(true),
            TAG_U8 => {
                let b = read_bytes(input, pos, 1)?;
                pos += 1;
                Value::U8(b[0])
            }
            TAG_I8 => {
                let b = read_bytes(input, pos, 1)?;
                pos += 1;
                Value::I8(b[0] as i8)
            }
            TAG_U16 => {
                let b = read_bytes(input, pos, 2)?;
                pos += 2;
                Value::U16(u16::from_be_bytes(b.try_into().unwrap()))
            }
            TAG_I16 => {
                let b = read_bytes(input, pos, 2)?;
                pos += 2;
                Value::I16(i16::from_be_bytes(b.try_into().unwrap()))
            }
            TAG_U32 => {
                let b = read_bytes(input, pos, 4)?;
                pos += 4;
                Value::U32(u32::from_be_bytes(b.try_into().unwrap()))
            }
            TAG_I32 => {
                let b = read_bytes(input, pos, 4)?;
                pos += 4;
                Value::I32(i32::from_be_bytes(b.try_into().unwrap()))
            }
            TAG_U64 => {
                let b = read_bytes(input, pos, 8)?;
                pos += 8;
                Value::U64(u64::from_be_bytes(b.try_into().unwrap()))
            }
            TAG_I64 => {
                let b = read_bytes(input, pos, 8)?;
                pos += 8;
                Value::I64(i64::from_be_bytes(b.try_into().unwrap()))
            }
            TAG_F32 => {
                let b = read_bytes(input, pos, 4)?;
                pos += 4;
                Value::F32(f32::from_be_bytes(b.try_into().unwrap()))
            }
            TAG_F64 => {
                let b = read_bytes(input, pos, 8)?;
                pos += 8;
                Value::F64(f64::from_be_bytes(b.try_into().unwrap()))
            }
            TAG_BYTES => {
                let (len, n) = decode_varint(&input[pos..])?;
                pos += n;
                let b = read_bytes(input, pos, len as usize)?;
                pos += len as usize;
                Value::Bytes(b.to_vec())
            }
            TAG_TEXT => {
                let (len, n) = decode_varint(&input[pos..])?;
                pos += n;
                let b = read_bytes(input, pos, len as usize)?;
                pos += len as usize;
                let s = std::str::from_utf8(b).map_err(|_| SerialError::InvalidUtf8)?;
                Value::Text(s.to_string())
            }
            TAG_SEQ => {
                let (len, n) = decode_varint(&input[pos..])?;
                pos += n;
                let mut items = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    let (item, consumed) = Value::decode(&input[pos..])?;
                    pos += consumed;
                    items.push(item);
                }
                Value::Seq(items)
            }
            TAG_MAP => {
                let (len, n) = decode_varint(&input[pos..])?;
                pos += n;
                let mut map = BTreeMap::new();
                let mut prev_key: Option<String> = None;
                for _ in 0..len {
                    let (key_len, n) = decode_varint(&input[pos..])?;
                    pos += n;
                    let key_bytes = read_bytes(input, pos, key_len as usize)?;
                    pos += key_len as usize;
                    let key =
                        std::str::from_utf8(key_bytes).map_err(|_| SerialError::InvalidUtf8)?;
                    if let Some(ref prev) = prev_key {
                        if key <= prev.as_str() {
                            return Err(SerialError::NonCanonicalMapKeys);
                        }
                    }
                    prev_key = Some(key.to_string());
                    let (value, consumed) = Value::decode(&input[pos..])?;
                    pos += consumed;
                    map.insert(key.to_string(), value);
                }
                Value::Map(map)
            }
            other => return Err(SerialError::InvalidTag(other)),
        };
        Ok((value, pos))
    }
}

fn read_bytes(input: &[u8], pos: usize, len: usize) -> Result<&[u8]> {
    let end = pos.checked_add(len).ok_or(SerialError::TruncatedInput {
        needed: usize::MAX,
    })?;
    input.get(pos..end).ok_or(SerialError::TruncatedInput {
        needed: end.saturating_sub(input.len()),
    })
}

/// Build a canonical map from an iterator of `(key, value)` pairs.
#[must_use]
pub fn map_from_pairs<I: IntoIterator<Item = (&'static str, Value)>>(pairs: I) -> Value {
    let mut map = BTreeMap::new();
    for (k, v) in pairs {
        map.insert(k.to_string(), v);
    }
    Value::Map(map)
}

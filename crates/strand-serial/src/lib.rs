//! # strand-serial
//!
//! Deterministic varint + TLV encoding used for frame metadata,
//! associated-data maps, and handshake message bodies throughout the
//! `strand` protocol stack.
//!
//! The type taxonomy is a closed set of 14 tags (null, booleans, sized
//! integers, floats, byte/text strings, sequences, maps). Maps are always
//! serialized with keys in lexicographic byte order, integers use the
//! smallest tag that fits the value, and strings are validated as UTF-8 on
//! decode. `decode(encode(v)) == v` holds for every representable `v`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod value;
pub mod varint;

pub use error::SerialError;
pub use value::{map_from_pairs, Value};
pub use varint::{decode_varint, encode_varint, MAX_VARINT_LEN};

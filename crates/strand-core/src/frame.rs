//! Binary frame wire format.
//!
//! ```text
//! magic : 2 bytes       = 0x53 0x54
//! type  : 1 byte
//! sid   : 8 bytes       (session_id; all-zero during handshake)
//! stream: varint
//! seq   : varint
//! flags : 1 byte
//! plen  : varint
//! payload: plen bytes
//! mlen  : varint
//! meta  : mlen bytes    (TLV-encoded map; empty for unencrypted frames)
//! ```
//!
//! Parsing borrows from the input buffer; building produces an owned byte
//! vector ready for the transport.

use strand_crypto::{Metadata, StreamCrypto};
use strand_serial::{decode_varint, encode_varint, map_from_pairs, Value};

use crate::error::FrameError;

/// Magic bytes every frame begins with.
pub const MAGIC: [u8; 2] = [0x53, 0x54];

/// Maximum total encoded frame size, in bytes.
pub const MAX_FRAME_SIZE: usize = 2 * 1024 * 1024;

/// Session id used in frame headers before a session is established.
pub const HANDSHAKE_SESSION_ID: [u8; 8] = [0u8; 8];

/// `FIN` flag: this frame carries the last chunk of a segmented message.
pub const FLAG_FIN: u8 = 0x01;

/// The five wire-level frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// A handshake message (cleartext payload).
    Handshake = 0x01,
    /// An encrypted application data frame.
    Data = 0x02,
    /// A session-level control frame (e.g. rotation exchange).
    Control = 0x03,
    /// A stream-level control frame (flow-control credit replenishment).
    StreamControl = 0x04,
    /// An authentication-proof frame.
    Auth = 0x05,
}

impl TryFrom<u8> for FrameType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(FrameType::Handshake),
            0x02 => Ok(FrameType::Data),
            0x03 => Ok(FrameType::Control),
            0x04 => Ok(FrameType::StreamControl),
            0x05 => Ok(FrameType::Auth),
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(t: FrameType) -> Self {
        t as u8
    }
}

/// A parsed frame, borrowing `payload`/`meta` from the input buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFrame<'a> {
    /// The frame's type.
    pub frame_type: FrameType,
    /// The 8-byte session identifier (all-zero during handshake).
    pub session_id: [u8; 8],
    /// The stream this frame belongs to (0 is reserved for control).
    pub stream_id: u64,
    /// The frame's sequence number within its stream.
    pub sequence: u64,
    /// The single flags byte.
    pub flags: u8,
    /// Cleartext (handshake) or ciphertext (data/control) payload.
    pub payload: &'a [u8],
    /// TLV-encoded crypto metadata map; empty for unencrypted frames.
    pub meta: &'a [u8],
}

impl<'a> ParsedFrame<'a> {
    /// Parse one frame from the front of `buf`.
    ///
    /// Returns the parsed frame and the number of bytes consumed.
    pub fn parse(buf: &'a [u8]) -> Result<(Self, usize), FrameError> {
        if buf.len() < MAGIC.len() + 1 + 8 {
            return Err(FrameError::TruncatedFrame);
        }
        if buf[0..2] != MAGIC {
            return Err(FrameError::BadMagic);
        }
        let frame_type = FrameType::try_from(buf[2])?;
        let mut pos = 3;

        let mut session_id = [0u8; 8];
        session_id.copy_from_slice(&buf[pos..pos + 8]);
        pos += 8;

        let (stream_id, n) = decode_varint(&buf[pos..]).map_err(|_| FrameError::TruncatedFrame)?;
        pos += n;

        let (sequence, n) = decode_varint(&buf[pos..]).map_err(|_| FrameError::TruncatedFrame)?;
        pos += n;

        let flags = *buf.get(pos).ok_or(FrameError::TruncatedFrame)?;
        pos += 1;

        let (plen, n) = decode_varint(&buf[pos..]).map_err(|_| FrameError::TruncatedFrame)?;
        pos += n;
        let plen = plen as usize;
        let payload = buf.get(pos..pos + plen).ok_or(FrameError::TruncatedFrame)?;
        pos += plen;

        let (mlen, n) = decode_varint(&buf[pos..]).map_err(|_| FrameError::TruncatedFrame)?;
        pos += n;
        let mlen = mlen as usize;
        let meta = buf.get(pos..pos + mlen).ok_or(FrameError::TruncatedFrame)?;
        pos += mlen;

        if pos > MAX_FRAME_SIZE {
            return Err(FrameError::OversizeFrame);
        }

        Ok((
            ParsedFrame {
                frame_type,
                session_id,
                stream_id,
                sequence,
                flags,
                payload,
                meta,
            },
            pos,
        ))
    }

    /// Build the associated-data map bound at encrypt time: `{type,
    /// session_id, stream_id, sequence}`.
    #[must_use]
    pub fn associated_data(&self) -> Value {
        associated_data(self.frame_type, self.session_id, self.stream_id, self.sequence)
    }
}

/// Build the associated-data map bound verbatim to a frame's header
/// fields. Any mismatch between this and what was bound at encrypt time
/// fails decryption -- this is what binds the header to the payload.
#[must_use]
pub fn associated_data(frame_type: FrameType, session_id: [u8; 8], stream_id: u64, sequence: u64) -> Value {
    map_from_pairs([
        ("type", Value::U8(frame_type as u8)),
        ("session_id", Value::Bytes(session_id.to_vec())),
        ("stream_id", Value::from_u64_fitting(stream_id)),
        ("sequence", Value::from_u64_fitting(sequence)),
    ])
}

/// Incrementally builds an owned, encoded frame.
pub struct FrameBuilder {
    frame_type: FrameType,
    session_id: [u8; 8],
    stream_id: u64,
    sequence: u64,
    flags: u8,
    payload: Vec<u8>,
    meta: Vec<u8>,
}

impl FrameBuilder {
    /// Start building a frame of the given type.
    #[must_use]
    pub fn new(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            session_id: HANDSHAKE_SESSION_ID,
            stream_id: 0,
            sequence: 0,
            flags: 0,
            payload: Vec::new(),
            meta: Vec::new(),
        }
    }

    /// Set the session id.
    #[must_use]
    pub fn session_id(mut self, id: [u8; 8]) -> Self {
        self.session_id = id;
        self
    }

    /// Set the stream id.
    #[must_use]
    pub fn stream_id(mut self, id: u64) -> Self {
        self.stream_id = id;
        self
    }

    /// Set the sequence number.
    #[must_use]
    pub fn sequence(mut self, seq: u64) -> Self {
        self.sequence = seq;
        self
    }

    /// Set the flags byte.
    #[must_use]
    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    /// Set the payload bytes.
    #[must_use]
    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Set the crypto-metadata TLV bytes.
    #[must_use]
    pub fn meta(mut self, meta: Vec<u8>) -> Self {
        self.meta = meta;
        self
    }

    /// Encode the frame, consuming the builder.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::OversizeFrame`] if the encoded frame would
    /// exceed [`MAX_FRAME_SIZE`].
    #[must_use = "the encoded frame must be sent or it is lost"]
    pub fn build(self) -> Result<Vec<u8>, FrameError> {
        let mut out = Vec::with_capacity(32 + self.payload.len() + self.meta.len());
        out.extend_from_slice(&MAGIC);
        out.push(self.frame_type.into());
        out.extend_from_slice(&self.session_id);
        encode_varint(self.stream_id, &mut out);
        encode_varint(self.sequence, &mut out);
        out.push(self.flags);
        encode_varint(self.payload.len() as u64, &mut out);
        out.extend_from_slice(&self.payload);
        encode_varint(self.meta.len() as u64, &mut out);
        out.extend_from_slice(&self.meta);

        if out.len() > MAX_FRAME_SIZE {
            return Err(FrameError::OversizeFrame);
        }
        Ok(out)
    }
}

/// Encrypt `payload` and build a complete encoded frame, binding
/// `{type, session_id, stream_id, sequence}` as associated data.
///
/// # Errors
///
/// Returns [`FrameError::OversizeFrame`] if the result exceeds the frame
/// size limit, or a crypto error if encryption fails.
pub fn encrypt_into_frame(
    frame_type: FrameType,
    session_id: [u8; 8],
    stream_id: u64,
    sequence: u64,
    flags: u8,
    plaintext: &[u8],
    key: &[u8],
) -> Result<Vec<u8>, crate::error::Error> {
    let ad = associated_data(frame_type, session_id, stream_id, sequence);
    let (ciphertext, metadata) = strand_crypto::encrypt(plaintext, key, &ad)?;
    let meta_value = Value::Bytes(metadata.as_bytes().to_vec());

    let frame = FrameBuilder::new(frame_type)
        .session_id(session_id)
        .stream_id(stream_id)
        .sequence(sequence)
        .flags(flags)
        .payload(ciphertext)
        .meta(meta_value.to_bytes())
        .build()?;
    Ok(frame)
}

/// Parse and decrypt one frame from `buf`, verifying that the associated
/// data reconstructed from the header matches what was bound at encrypt
/// time.
///
/// Returns the decrypted plaintext and the number of input bytes consumed.
pub fn decrypt_from_frame(buf: &[u8], key: &[u8]) -> Result<(Vec<u8>, usize), crate::error::Error> {
    let (parsed, consumed) = ParsedFrame::parse(buf)?;
    let (meta_value, _) = Value::decode(parsed.meta).map_err(crate::error::Error::Serial)?;
    let Value::Bytes(meta_bytes) = meta_value else {
        return Err(FrameError::DecryptFailed.into());
    };
    let metadata = Metadata::from_bytes(meta_bytes);
    let ad = parsed.associated_data();
    let plaintext = strand_crypto::decrypt(parsed.payload, key, &metadata, &ad)?;
    Ok((plaintext, consumed))
}

/// Decrypt an already-parsed frame, verifying that the associated data
/// reconstructed from its header matches what was bound at encrypt time.
///
/// Use this over [`decrypt_from_frame`] when the caller already holds a
/// [`ParsedFrame`] and re-parsing the raw bytes would be wasted work.
pub fn decrypt_parsed(parsed: &ParsedFrame<'_>, key: &[u8]) -> Result<Vec<u8>, crate::error::Error> {
    let (meta_value, _) = Value::decode(parsed.meta).map_err(crate::error::Error::Serial)?;
    let Value::Bytes(meta_bytes) = meta_value else {
        return Err(FrameError::DecryptFailed.into());
    };
    let metadata = Metadata::from_bytes(meta_bytes);
    let ad = parsed.associated_data();
    let plaintext = strand_crypto::decrypt(parsed.payload, key, &metadata, &ad)?;
    Ok(plaintext)
}

/// Encrypt one chunk of stream payload via a per-stream crypto context and
/// wrap it directly into a DATA frame.
pub fn encrypt_chunk_into_frame(
    session_id: [u8; 8],
    stream_id: u64,
    sequence: u64,
    chunk_index: u64,
    flags: u8,
    plaintext: &[u8],
    stc: &StreamCrypto,
) -> Result<Vec<u8>, crate::error::Error> {
    let ciphertext = stc.encrypt_chunk(plaintext, chunk_index)?;
    let frame = FrameBuilder::new(FrameType::Data)
        .session_id(session_id)
        .stream_id(stream_id)
        .sequence(sequence)
        .flags(flags)
        .payload(ciphertext)
        .build()?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_key() -> [u8; 32] {
        [0x11; 32]
    }

    #[test]
    fn round_trips_plain_frame() {
        let frame = FrameBuilder::new(FrameType::Handshake)
            .stream_id(0)
            .sequence(1)
            .payload(b"hello handshake".to_vec())
            .build()
            .unwrap();
        let (parsed, consumed) = ParsedFrame::parse(&frame).unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(parsed.frame_type, FrameType::Handshake);
        assert_eq!(parsed.payload, b"hello handshake");
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut frame = FrameBuilder::new(FrameType::Data).build().unwrap();
        frame[0] = 0x00;
        assert_eq!(ParsedFrame::parse(&frame).unwrap_err(), FrameError::BadMagic);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut frame = FrameBuilder::new(FrameType::Data).build().unwrap();
        frame[2] = 0xee;
        assert_eq!(
            ParsedFrame::parse(&frame).unwrap_err(),
            FrameError::UnknownType(0xee)
        );
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let frame = FrameBuilder::new(FrameType::Data)
            .payload(b"some data".to_vec())
            .build()
            .unwrap();
        assert_eq!(
            ParsedFrame::parse(&frame[..frame.len() - 2]).unwrap_err(),
            FrameError::TruncatedFrame
        );
    }

    #[test]
    fn encrypt_decrypt_round_trips_through_frame() {
        let key = test_key();
        let session_id = [7u8; 8];
        let frame = encrypt_into_frame(FrameType::Data, session_id, 3, 42, 0, b"payload bytes", &key).unwrap();
        let (plaintext, consumed) = decrypt_from_frame(&frame, &key).unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(plaintext, b"payload bytes");
    }

    #[test]
    fn tampering_with_header_fails_decryption() {
        let key = test_key();
        let session_id = [7u8; 8];
        let mut frame = encrypt_into_frame(FrameType::Data, session_id, 3, 42, 0, b"payload bytes", &key).unwrap();
        // Flip a bit in the stream_id field (byte index 11, right after
        // magic(2) + type(1) + session_id(8)).
        frame[11] ^= 0x01;
        assert!(decrypt_from_frame(&frame, &key).is_err());
    }

    #[test]
    fn chunked_stream_frame_round_trips() {
        let key = test_key();
        let stc = StreamCrypto::new(&key, 9);
        let session_id = [1u8; 8];
        let frame = encrypt_chunk_into_frame(session_id, 9, 0, 0, 0, b"chunk payload", &stc).unwrap();
        let (parsed, _) = ParsedFrame::parse(&frame).unwrap();
        let plaintext = stc.decrypt_chunk(parsed.payload, 0).unwrap();
        assert_eq!(plaintext, b"chunk payload");
    }

    proptest! {
        #[test]
        fn prop_round_trip_arbitrary_payload(payload in proptest::collection::vec(any::<u8>(), 0..256), seq: u32, stream: u32) {
            let frame = FrameBuilder::new(FrameType::Control)
                .stream_id(stream as u64)
                .sequence(seq as u64)
                .payload(payload.clone())
                .build()
                .unwrap();
            let (parsed, consumed) = ParsedFrame::parse(&frame).unwrap();
            prop_assert_eq!(consumed, frame.len());
            prop_assert_eq!(parsed.payload, payload.as_slice());
            prop_assert_eq!(parsed.stream_id, stream as u64);
            prop_assert_eq!(parsed.sequence, seq as u64);
        }
    }
}

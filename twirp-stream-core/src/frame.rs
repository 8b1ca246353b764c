//! Streaming response framing.
//!
//! A streaming Twirp response body is a sequence of length-delimited frames,
//! laid out like the fields of a protobuf message:
//!
//! ```text
//! [tag:varint][length:varint][payload:length]
//! ```
//!
//! Tags:
//! - `10` (field 1, length-delimited): a serialized response message
//! - `18` (field 2, length-delimited): the trailer, UTF-8 text holding either
//!   `EOF` or a JSON error payload
//!
//! This module provides the constants, the varint codec and frame encoders.

use bytes::BufMut;

/// Wire type for length-delimited fields.
pub const WIRE_TYPE_LEN: u8 = 2;

/// Tag of a message frame: field 1, length-delimited.
pub const MESSAGE_TAG: u64 = (1 << 3) | WIRE_TYPE_LEN as u64;

/// Tag of the trailer frame: field 2, length-delimited.
pub const TRAILER_TAG: u64 = (2 << 3) | WIRE_TYPE_LEN as u64;

/// Trailer text that marks clean end of stream.
pub const EOF_MARKER: &str = "EOF";

/// Longest valid varint encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Framing errors.
///
/// Produced while reading frames from a response body.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The body ended before the requested bytes arrived.
    #[error("unexpected end of stream: needed {expected} bytes, {available} available")]
    UnexpectedEof { expected: usize, available: usize },

    /// A varint did not terminate within ten bytes.
    #[error("varint exceeds 64 bits")]
    VarintOverflow,

    /// A frame length does not fit in memory on this platform.
    #[error("frame length {0} is too large")]
    LengthOverflow(u64),

    /// A trailer frame is not valid UTF-8.
    #[error("invalid UTF-8 in frame: {0}")]
    InvalidUtf8(String),

    /// The underlying body failed.
    #[error("i/o error: {0}")]
    Io(String),
}

impl FrameError {
    /// Wrap a body failure, keeping the text of its whole source chain.
    pub fn io<E: std::error::Error + ?Sized>(err: &E) -> Self {
        FrameError::Io(crate::error::describe(err))
    }
}

/// Build a tag from a field number and wire type.
pub fn make_tag(field_number: u32, wire_type: u8) -> u64 {
    ((field_number as u64) << 3) | (wire_type as u64 & 0x07)
}

/// Field number encoded in a tag.
pub fn field_number(tag: u64) -> u64 {
    tag >> 3
}

/// Wire type encoded in a tag.
pub fn wire_type(tag: u64) -> u8 {
    (tag & 0x07) as u8
}

/// Encode a varint.
pub fn encode_varint(mut value: u64, buf: &mut impl BufMut) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

/// Decode a varint from the front of `buf`.
///
/// Returns:
/// - `Ok(Some((value, consumed)))` if a complete varint is present
/// - `Ok(None)` if `buf` ends in the middle of a varint
/// - `Err(VarintOverflow)` if the encoding is longer than 64 bits allow
pub fn decode_varint(buf: &[u8]) -> Result<Option<(u64, usize)>, FrameError> {
    let mut value: u64 = 0;
    for (i, &byte) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        // The tenth byte may only carry the top bit of a u64.
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(FrameError::VarintOverflow);
        }
        value |= ((byte & 0x7F) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if buf.len() >= MAX_VARINT_LEN {
        return Err(FrameError::VarintOverflow);
    }
    Ok(None)
}

/// Append a frame with the given tag.
pub fn encode_frame(tag: u64, payload: &[u8], buf: &mut impl BufMut) {
    encode_varint(tag, buf);
    encode_varint(payload.len() as u64, buf);
    buf.put_slice(payload);
}

/// Append a message frame.
pub fn encode_message_frame(payload: &[u8], buf: &mut impl BufMut) {
    encode_frame(MESSAGE_TAG, payload, buf);
}

/// Append a trailer frame carrying `text`.
pub fn encode_trailer_frame(text: &str, buf: &mut impl BufMut) {
    encode_frame(TRAILER_TAG, text.as_bytes(), buf);
}

/// Append the clean end-of-stream trailer.
pub fn encode_eof_trailer(buf: &mut impl BufMut) {
    encode_trailer_frame(EOF_MARKER, buf);
}

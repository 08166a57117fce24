//! The fixed-size message header.
//!
//! Every message opens with 9 bytes: the code byte at offset 0, the
//! content length as a little-endian `u32` at offsets 1..5, and four
//! reserved bytes at offsets 5..9. The reserved bytes are protocol
//! padding: zero-filled on encode, ignored on decode.
//!
//! All multi-byte integers in this crate are little-endian.

use crate::error::CastError;
use crate::message::MessageCode;

/// Wire size of the fixed message header.
pub const HEADER_SIZE: usize = 9;

/// Structural upper bound on a declared content length.
///
/// Anything larger is judged impossible and rejected at decode time to
/// bound per-connection memory. Well above the largest frame piece the
/// protocol produces.
pub const MAX_CONTENT_SIZE: usize = 16 * 1024 * 1024;

pub type HeaderBytes = [u8; HEADER_SIZE];

/// A decoded message header: raw code byte plus declared content length.
///
/// The code stays a raw `u8` here so that an unknown code survives
/// decoding; resolution to [`MessageCode`] happens at dispatch, where an
/// unknown value is a no-op rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    code: u8,
    content_length: u32,
}

impl MessageHeader {
    pub fn new(code: u8, content_length: u32) -> Self {
        Self {
            code,
            content_length,
        }
    }

    /// Serialize to the 9-byte wire form.
    pub fn to_bytes(&self) -> HeaderBytes {
        let mut buf: HeaderBytes = [0; HEADER_SIZE];
        buf[0] = self.code;
        buf[1..5].copy_from_slice(&self.content_length.to_le_bytes());
        // bytes 5..9 stay zero (reserved)
        buf
    }

    /// Parse a header from at least [`HEADER_SIZE`] bytes.
    ///
    /// Rejects only structurally impossible values: a short slice, or a
    /// declared length above [`MAX_CONTENT_SIZE`].
    pub fn decode(bytes: &[u8]) -> Result<Self, CastError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CastError::MalformedHeader("fewer than 9 bytes"));
        }
        let code = bytes[0];
        let content_length = u32::from_le_bytes(
            bytes[1..5]
                .try_into()
                .map_err(|_| CastError::MalformedHeader("length field"))?,
        );
        if content_length as usize > MAX_CONTENT_SIZE {
            return Err(CastError::ContentTooLarge {
                size: content_length as usize,
                max: MAX_CONTENT_SIZE,
            });
        }
        Ok(Self {
            code,
            content_length,
        })
    }

    /// The raw code byte.
    pub fn code(&self) -> u8 {
        self.code
    }

    /// The code resolved against the closed set, if known.
    pub fn message_code(&self) -> Option<MessageCode> {
        MessageCode::try_from(self.code).ok()
    }

    pub fn content_length(&self) -> u32 {
        self.content_length
    }
}

// ── Tests ────────────────────────────────────────────────────────

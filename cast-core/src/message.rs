//! Protocol message codes, session types, and the framed `Message` value.
//!
//! Codes are a small closed set fixed by the wire protocol. Inbound bytes
//! carry a raw `u8`; resolution to [`MessageCode`] happens at dispatch so
//! that an unknown code is a no-op rather than a connection-fatal error.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CastError;
use crate::header::{HEADER_SIZE, MessageHeader};

// ── MessageCode ──────────────────────────────────────────────────

/// All message codes understood by the cast protocol.
///
/// Organized by category:
/// - `1..=6`   — Authentication handshake
/// - `10..=19` — Screen capture (audio codes present but disabled)
/// - `40..=44` — Input capture
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCode {
    // ── Authentication ───────────────────────────────────────────
    /// Request authentication for a movie session.
    AuthMovie = 1,
    /// Request authentication for a screen-capture session.
    AuthScreenCapture = 2,
    /// Request authentication for an input-capture session.
    AuthInput = 3,
    /// Handshake result: accepted.
    AuthSuccess = 5,
    /// Handshake result: rejected.
    AuthFailed = 6,

    // ── Screen capture ───────────────────────────────────────────
    /// Start streaming frames to this session.
    ScreenStart = 10,
    /// Stop streaming frames.
    ScreenStop = 11,
    /// Update stream settings (13-byte body).
    ScreenChangeSetting = 12,
    /// A frame piece (body carries the 5-byte piece prefix + payload).
    ScreenNewFrame = 15,
    /// Acknowledge receipt of a frame piece.
    ScreenFrameReceived = 16,
    /// An audio frame. Disabled in the protocol; accepted and ignored.
    AudioNewFrame = 18,
    /// Audio receipt acknowledgement. Disabled; accepted and ignored.
    AudioFrameReceived = 19,

    // ── Input capture ────────────────────────────────────────────
    /// Start forwarding input reports.
    InputStart = 40,
    /// Stop forwarding input reports.
    InputStop = 41,
    /// An input report (16-byte body).
    InputSend = 42,
    /// An idle input report (no buttons, no pad movement).
    InputSendIdle = 44,
}

impl TryFrom<u8> for MessageCode {
    type Error = CastError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageCode::AuthMovie),
            2 => Ok(MessageCode::AuthScreenCapture),
            3 => Ok(MessageCode::AuthInput),
            5 => Ok(MessageCode::AuthSuccess),
            6 => Ok(MessageCode::AuthFailed),

            10 => Ok(MessageCode::ScreenStart),
            11 => Ok(MessageCode::ScreenStop),
            12 => Ok(MessageCode::ScreenChangeSetting),
            15 => Ok(MessageCode::ScreenNewFrame),
            16 => Ok(MessageCode::ScreenFrameReceived),
            18 => Ok(MessageCode::AudioNewFrame),
            19 => Ok(MessageCode::AudioFrameReceived),

            40 => Ok(MessageCode::InputStart),
            41 => Ok(MessageCode::InputStop),
            42 => Ok(MessageCode::InputSend),
            44 => Ok(MessageCode::InputSendIdle),

            _ => Err(CastError::UnknownVariant {
                type_name: "MessageCode",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── SessionType ──────────────────────────────────────────────────

/// The traffic class a connection is authenticated for.
///
/// Set once at session init and immutable thereafter. A connection that
/// has not yet authenticated carries `Option<SessionType>::None` on the
/// relay side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionType {
    /// Pre-encoded movie streaming. Inbound handler is an extension point.
    Movie,
    /// Live screen-capture streaming (frame pieces + acks).
    ScreenCapture,
    /// Input report forwarding.
    InputCapture,
}

impl SessionType {
    /// The authentication-request code this session type opens with.
    pub fn auth_code(&self) -> MessageCode {
        match self {
            SessionType::Movie => MessageCode::AuthMovie,
            SessionType::ScreenCapture => MessageCode::AuthScreenCapture,
            SessionType::InputCapture => MessageCode::AuthInput,
        }
    }

    /// Resolve an authentication-request code back to a session type.
    ///
    /// Returns `None` for any code that is not an authentication request.
    pub fn from_auth_code(code: MessageCode) -> Option<SessionType> {
        match code {
            MessageCode::AuthMovie => Some(SessionType::Movie),
            MessageCode::AuthScreenCapture => Some(SessionType::ScreenCapture),
            MessageCode::AuthInput => Some(SessionType::InputCapture),
            _ => None,
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionType::Movie => write!(f, "movie"),
            SessionType::ScreenCapture => write!(f, "screen-capture"),
            SessionType::InputCapture => write!(f, "input-capture"),
        }
    }
}

// ── Message ──────────────────────────────────────────────────────

/// An immutable framed message: header plus exactly-sized content.
///
/// The invariant `content.len() == header.content_length()` holds for
/// every constructed value; there is no partially-built `Message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: MessageHeader,
    content: Bytes,
}

impl Message {
    /// A header-only message (content length zero).
    pub fn header_only(code: MessageCode) -> Self {
        Self {
            header: MessageHeader::new(code as u8, 0),
            content: Bytes::new(),
        }
    }

    /// A message carrying `content`.
    ///
    /// Fails if the content exceeds the structural maximum.
    pub fn with_content(code: MessageCode, content: Bytes) -> Result<Self, CastError> {
        if content.len() > crate::header::MAX_CONTENT_SIZE {
            return Err(CastError::ContentTooLarge {
                size: content.len(),
                max: crate::header::MAX_CONTENT_SIZE,
            });
        }
        Ok(Self {
            header: MessageHeader::new(code as u8, content.len() as u32),
            content,
        })
    }

    /// Reconstruct a message from an already-parsed header and its body.
    ///
    /// Fails with `BodySizeMismatch` if the body length disagrees with
    /// the header's declared content length.
    pub fn from_parts(header: MessageHeader, content: Bytes) -> Result<Self, CastError> {
        if content.len() != header.content_length() as usize {
            return Err(CastError::BodySizeMismatch {
                declared: header.content_length() as usize,
                delivered: content.len(),
            });
        }
        Ok(Self { header, content })
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    /// The raw code byte.
    pub fn code(&self) -> u8 {
        self.header.code()
    }

    /// The code resolved to the closed set, if known.
    pub fn message_code(&self) -> Option<MessageCode> {
        self.header.message_code()
    }

    pub fn content_length(&self) -> u32 {
        self.header.content_length()
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Serialize to wire bytes: 9-byte header followed by the content.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.content.len());
        buf.put_slice(&self.header.to_bytes());
        buf.put_slice(&self.content);
        buf.freeze()
    }
}

// ── Tests ────────────────────────────────────────────────────────

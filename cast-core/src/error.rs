//! Domain-specific error types for the cast protocol.
//!
//! All fallible operations return `Result<T, CastError>`.
//! No panics on network input — every error is typed and recoverable.

use thiserror::Error;

/// The canonical error type for the cast protocol.
#[derive(Debug, Error)]
pub enum CastError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// The fixed-size message header could not be parsed.
    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),

    /// The header declared a content length beyond the structural maximum.
    #[error("content too large: {size} bytes (max {max})")]
    ContentTooLarge { size: usize, max: usize },

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// The peer did not answer the handshake with the success code.
    /// Fatal to the connection; there is no retry at this layer.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// A delivered body did not match the header's declared length.
    /// Resolved by silently dropping the message, never surfaced upward.
    #[error("body size mismatch: declared {declared}, delivered {delivered}")]
    BodySizeMismatch { declared: usize, delivered: usize },

    // ── Payload Errors ───────────────────────────────────────────
    /// A fixed-size payload had the wrong length.
    #[error("invalid payload length: expected {expected}, got {actual}")]
    InvalidPayloadLength { expected: usize, actual: usize },

    /// A frame-piece body was shorter than its 5-byte prefix.
    #[error("piece content too short: {0} bytes")]
    PieceTooShort(usize),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// The session was torn down while an operation was in flight.
    #[error("session closed")]
    SessionClosed,
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for CastError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        CastError::ChannelClosed
    }
}

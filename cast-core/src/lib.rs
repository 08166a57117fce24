//! # cast-core
//!
//! Core protocol library for the cast screen/input streaming suite.
//!
//! This crate contains:
//! - **Protocol types**: `MessageHeader`, `Message`, `MessageCode`, `SessionType`
//! - **Protocol payloads**: `StreamSettings`, `FramePiece`, `InputReport`
//! - **Demultiplexer**: `ConnectionBuffer` — exact-size reads over a chunked stream
//! - **Session**: the client-role connection state machine
//! - **Tracker**: `FramePieceTracker` for out-of-order frame reassembly
//! - **Network**: `Connection` for managed TCP transport
//! - **Error**: `CastError` — typed, `thiserror`-based error hierarchy
//!
//! All wire integers are little-endian.

pub mod buffer;
pub mod consumer;
pub mod error;
pub mod header;
pub mod message;
pub mod network;
pub mod protocol;
pub mod session;
pub mod tracker;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use buffer::{BUFFER_GROWTH_STEP, ConnectionBuffer, DEFAULT_BUFFER_CAPACITY};
pub use consumer::FrameConsumer;
pub use error::CastError;
pub use header::{HEADER_SIZE, MAX_CONTENT_SIZE, MessageHeader};
pub use message::{Message, MessageCode, SessionType};
pub use network::{Connection, ConnectionInfo, OutboundSender, TransportEvent};
pub use protocol::{
    ButtonMask, FramePiece, INPUT_REPORT_SIZE, InputReport, PIECE_PREFIX_SIZE,
    STREAM_SETTINGS_SIZE, StreamSettings,
};
pub use session::{ClientSession, SessionCommand, SessionEvent, SessionHandle, SessionState};
pub use tracker::{FramePieceTracker, FrameSnapshot};

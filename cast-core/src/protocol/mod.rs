//! Fixed-layout message bodies.
//!
//! Body semantics depend on the message code; this module holds the
//! payload types with an exact wire layout: stream settings, frame
//! pieces, and input reports. Layouts are documented per type; all
//! integers little-endian.

pub mod input;
pub mod screen;

pub use input::{ButtonMask, INPUT_REPORT_SIZE, InputReport};
pub use screen::{FramePiece, PIECE_PREFIX_SIZE, STREAM_SETTINGS_SIZE, StreamSettings};

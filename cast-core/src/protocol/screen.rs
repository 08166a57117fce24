//! Screen-capture bodies: stream settings and frame pieces.
//!
//! ## Wire layout
//!
//! **Change-setting body** (13 bytes):
//! ```text
//! wait_for_received_frame:  u8   (1)  0 or 1
//! smooth_step_frames:       u32  (4)
//! source_quality:           u32  (4)  0..=100
//! source_scale:             u32  (4)  0..=100
//! ```
//!
//! **Frame-piece body** (5-byte prefix + payload):
//! ```text
//! frame_index:  u32  (4)
//! piece_index:  u8   (1)
//! payload:      [u8] (content length − 5)
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::CastError;

// ── StreamSettings ───────────────────────────────────────────────

/// Wire size of the change-setting body.
pub const STREAM_SETTINGS_SIZE: usize = 13;

/// Tunable stream parameters a viewer pushes to the relay.
///
/// Serde-derived so relay configuration files can embed defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Pace frames on the viewer's receipt acknowledgement.
    pub wait_for_received_frame: bool,

    /// How many frames may be in flight unacknowledged before pacing
    /// kicks in. Only meaningful when `wait_for_received_frame` is set.
    pub smooth_step_frames: u32,

    /// Encoder quality, 0..=100.
    pub source_quality: u32,

    /// Capture scale percentage, 0..=100.
    pub source_scale: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            wait_for_received_frame: true,
            smooth_step_frames: 4,
            source_quality: 75,
            source_scale: 100,
        }
    }
}

impl StreamSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set encoder quality, clamped to 0..=100.
    pub fn with_quality(mut self, quality: u32) -> Self {
        self.source_quality = quality.min(100);
        self
    }

    /// Set capture scale, clamped to 0..=100.
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.source_scale = scale.min(100);
        self
    }

    /// Serialize to the 13-byte wire form.
    pub fn encode(&self) -> [u8; STREAM_SETTINGS_SIZE] {
        let mut buf = [0u8; STREAM_SETTINGS_SIZE];
        buf[0] = self.wait_for_received_frame as u8;
        buf[1..5].copy_from_slice(&self.smooth_step_frames.to_le_bytes());
        buf[5..9].copy_from_slice(&self.source_quality.to_le_bytes());
        buf[9..13].copy_from_slice(&self.source_scale.to_le_bytes());
        buf
    }

    /// Parse from an exactly 13-byte body.
    pub fn decode(bytes: &[u8]) -> Result<Self, CastError> {
        if bytes.len() != STREAM_SETTINGS_SIZE {
            return Err(CastError::InvalidPayloadLength {
                expected: STREAM_SETTINGS_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            wait_for_received_frame: bytes[0] != 0,
            smooth_step_frames: u32::from_le_bytes(bytes[1..5].try_into().unwrap()),
            source_quality: u32::from_le_bytes(bytes[5..9].try_into().unwrap()),
            source_scale: u32::from_le_bytes(bytes[9..13].try_into().unwrap()),
        })
    }
}

// ── FramePiece ───────────────────────────────────────────────────

/// Byte length of the frame-piece prefix (frame index + piece index).
pub const PIECE_PREFIX_SIZE: usize = 5;

/// One fragment of a logical video frame.
///
/// Pieces of a frame arrive as independent messages in no guaranteed
/// order; the piece index disambiguates fragments within a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePiece {
    pub frame_index: u32,
    pub piece_index: u8,
    pub payload: Bytes,
}

impl FramePiece {
    pub fn new(frame_index: u32, piece_index: u8, payload: Bytes) -> Self {
        Self {
            frame_index,
            piece_index,
            payload,
        }
    }

    /// Parse a piece from a message body.
    ///
    /// The body must carry at least the 5-byte prefix; the payload is
    /// everything after it and may be empty.
    pub fn parse(content: &Bytes) -> Result<Self, CastError> {
        if content.len() < PIECE_PREFIX_SIZE {
            return Err(CastError::PieceTooShort(content.len()));
        }
        Ok(Self {
            frame_index: u32::from_le_bytes(content[0..4].try_into().unwrap()),
            piece_index: content[4],
            payload: content.slice(PIECE_PREFIX_SIZE..),
        })
    }

    /// Serialize to a message body: prefix followed by the payload.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PIECE_PREFIX_SIZE + self.payload.len());
        buf.put_u32_le(self.frame_index);
        buf.put_u8(self.piece_index);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! The frame-consumer seam.
//!
//! Whoever decides that a frame is complete (out-of-band piece count,
//! newer-frame flush, timeout) hands the assembled bytes through this
//! trait. Display and persistence live behind it, outside this crate.

use async_trait::async_trait;
use bytes::Bytes;

/// Receives reassembled frames once a completion policy claims them.
#[async_trait]
pub trait FrameConsumer: Send + Sync {
    async fn accept(&self, frame_index: u32, frame: Bytes);
}

//! Viewer-side frame completion policy and a stats consumer.
//!
//! The wire format never says how many pieces make a frame, so the
//! tracker cannot decide completion. The assembler applies two rules:
//!
//! - **Expected piece count** (optional, known out-of-band): a frame is
//!   claimed the moment that many pieces have arrived.
//! - **Newer-frame flush**: once a piece for a newer frame lands, any
//!   older in-progress frame is claimed best-effort — the relay sends
//!   frames in order, so nothing more is coming for it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use cast_core::{FrameConsumer, FramePieceTracker};
use tracing::info;

// ── FrameAssembler ───────────────────────────────────────────────

/// Watches tracker progress and claims frames per the policy above.
pub struct FrameAssembler {
    tracker: Arc<FramePieceTracker>,
    consumer: Arc<dyn FrameConsumer>,
    expected_pieces: Option<u8>,
    highest_seen: Option<u32>,
}

impl FrameAssembler {
    pub fn new(
        tracker: Arc<FramePieceTracker>,
        consumer: Arc<dyn FrameConsumer>,
        expected_pieces: Option<u8>,
    ) -> Self {
        Self {
            tracker,
            consumer,
            expected_pieces,
            highest_seen: None,
        }
    }

    /// Re-evaluate the policy after a piece of `frame_index` arrived.
    pub async fn on_piece(&mut self, frame_index: u32) {
        if let Some(expected) = self.expected_pieces {
            let complete = self
                .tracker
                .snapshot(frame_index)
                .is_some_and(|snap| snap.piece_count() >= expected as usize);
            if complete {
                if let Some(frame) = self.tracker.claim(frame_index) {
                    self.consumer.accept(frame_index, frame).await;
                }
            }
        }

        match self.highest_seen {
            None => self.highest_seen = Some(frame_index),
            Some(highest) if frame_index > highest => {
                for stale in self.tracker.frame_indices() {
                    if stale < frame_index {
                        if let Some(frame) = self.tracker.claim(stale) {
                            self.consumer.accept(stale, frame).await;
                        }
                    }
                }
                self.highest_seen = Some(frame_index);
            }
            Some(_) => {}
        }
    }
}

// ── StatsConsumer ────────────────────────────────────────────────

/// Counts completed frames and logs throughput periodically. Stands in
/// for a display pipeline, which is out of scope here.
pub struct StatsConsumer {
    frames: AtomicU64,
    bytes: AtomicU64,
    started: Instant,
    log_every: u64,
}

impl StatsConsumer {
    pub fn new(log_every: u64) -> Self {
        Self {
            frames: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            started: Instant::now(),
            log_every: log_every.max(1),
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn byte_count(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FrameConsumer for StatsConsumer {
    async fn accept(&self, frame_index: u32, frame: Bytes) {
        let frames = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        let bytes = self.bytes.fetch_add(frame.len() as u64, Ordering::Relaxed) + frame.len() as u64;

        if frames % self.log_every == 0 {
            let elapsed = self.started.elapsed().as_secs_f64().max(f64::EPSILON);
            info!(
                frame_index,
                frames,
                fps = format_args!("{:.1}", frames as f64 / elapsed),
                mib = format_args!("{:.1}", bytes as f64 / (1024.0 * 1024.0)),
                "frames received"
            );
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! Built-in frame producer generating color-bar test frames.
//!
//! Real capture and encoding live behind the [`FrameProducer`] seam;
//! this producer exists so a relay can be driven end-to-end without a
//! capture stack. Frames are raw RGB color bars with a moving offset so
//! viewers can verify that consecutive frames differ.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::{Interval, MissedTickBehavior, interval};

use crate::registry::FrameProducer;

/// Eight-bar palette, RGB.
const BARS: [(u8, u8, u8); 8] = [
    (255, 255, 255), // white
    (255, 255, 0),   // yellow
    (0, 255, 255),   // cyan
    (0, 255, 0),     // green
    (255, 0, 255),   // magenta
    (255, 0, 0),     // red
    (0, 0, 255),     // blue
    (0, 0, 0),       // black
];

/// Produces color-bar frames at a fixed rate.
pub struct PatternProducer {
    width: u32,
    height: u32,
    frame_counter: u64,
    ticker: Interval,
}

impl PatternProducer {
    pub fn new(width: u32, height: u32, frame_rate: u32) -> Self {
        let period = Duration::from_secs(1) / frame_rate.max(1);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            width,
            height,
            frame_counter: 0,
            ticker,
        }
    }

    /// Render one frame: vertical color bars, shifted by the frame
    /// counter so consecutive frames are distinguishable.
    pub fn render(&self) -> Bytes {
        let width = self.width as usize;
        let height = self.height as usize;
        let bar_width = (width / BARS.len()).max(1);
        let shift = self.frame_counter as usize;

        let mut buffer = Vec::with_capacity(width * height * 3);
        for _y in 0..height {
            for x in 0..width {
                let bar = ((x + shift) / bar_width) % BARS.len();
                let (r, g, b) = BARS[bar];
                buffer.push(r);
                buffer.push(g);
                buffer.push(b);
            }
        }
        Bytes::from(buffer)
    }
}

#[async_trait]
impl FrameProducer for PatternProducer {
    async fn next_frame(&mut self) -> Option<Bytes> {
        self.ticker.tick().await;
        let frame = self.render();
        self.frame_counter = self.frame_counter.wrapping_add(1);
        Some(frame)
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! Frame-piece reassembly tracker.
//!
//! Pieces of a frame arrive as independent messages in any order; the
//! tracker accumulates them keyed by `(frame_index, piece_index)`. The
//! wire format carries no total-piece-count, so the tracker cannot
//! decide completion itself — it exposes snapshots (received indices,
//! accumulated bytes) and the consumer applies its own policy before
//! claiming or evicting a frame.
//!
//! Shared between the network delivery path (`submit`) and a consumer
//! thread (`snapshot`/`claim`/`evict`). One coarse lock guards the whole
//! map; piece volume per frame is small, so the critical sections stay
//! short and no lock is ever held across an await point.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use bytes::{Bytes, BytesMut};

use crate::protocol::screen::FramePiece;

// ── FrameSnapshot ────────────────────────────────────────────────

/// Read-only view of one frame's reassembly progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    /// Piece indices received so far, ascending.
    pub piece_indices: Vec<u8>,
    /// Sum of payload bytes across the received pieces.
    pub total_bytes: usize,
}

impl FrameSnapshot {
    pub fn piece_count(&self) -> usize {
        self.piece_indices.len()
    }
}

// ── FramePieceTracker ────────────────────────────────────────────

/// Pieces accumulated for one frame, ordered by piece index.
#[derive(Debug, Default)]
struct FrameAssembly {
    pieces: BTreeMap<u8, Bytes>,
    total_bytes: usize,
}

/// Thread-safe accumulator of frame pieces across in-progress frames.
#[derive(Debug, Default)]
pub struct FramePieceTracker {
    frames: Mutex<HashMap<u32, FrameAssembly>>,
}

impl FramePieceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a piece, overwriting any earlier piece with the same
    /// `(frame_index, piece_index)` key. Idempotent for identical
    /// submissions and independent of arrival order.
    pub fn submit(&self, piece: FramePiece) {
        let mut frames = self.frames.lock().expect("tracker lock poisoned");
        let assembly = frames.entry(piece.frame_index).or_default();
        let new_len = piece.payload.len();
        if let Some(old) = assembly.pieces.insert(piece.piece_index, piece.payload) {
            assembly.total_bytes -= old.len();
        }
        assembly.total_bytes += new_len;
    }

    /// Progress of one frame, or `None` if no piece has arrived for it.
    pub fn snapshot(&self, frame_index: u32) -> Option<FrameSnapshot> {
        let frames = self.frames.lock().expect("tracker lock poisoned");
        frames.get(&frame_index).map(|assembly| FrameSnapshot {
            piece_indices: assembly.pieces.keys().copied().collect(),
            total_bytes: assembly.total_bytes,
        })
    }

    /// Assemble a frame in ascending piece-index order, releasing its
    /// pieces. Returns `None` if nothing was tracked for the index.
    ///
    /// The caller decides *when* a frame is complete; claiming early
    /// yields whatever has arrived.
    pub fn claim(&self, frame_index: u32) -> Option<Bytes> {
        let assembly = {
            let mut frames = self.frames.lock().expect("tracker lock poisoned");
            frames.remove(&frame_index)?
        };
        let mut out = BytesMut::with_capacity(assembly.total_bytes);
        for payload in assembly.pieces.values() {
            out.extend_from_slice(payload);
        }
        Some(out.freeze())
    }

    /// Release a frame's pieces without assembling (stale/abandoned).
    /// Returns whether anything was tracked for the index.
    pub fn evict(&self, frame_index: u32) -> bool {
        let mut frames = self.frames.lock().expect("tracker lock poisoned");
        frames.remove(&frame_index).is_some()
    }

    /// Frame indices with at least one piece tracked, ascending.
    pub fn frame_indices(&self) -> Vec<u32> {
        let frames = self.frames.lock().expect("tracker lock poisoned");
        let mut indices: Vec<u32> = frames.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// Number of frames currently tracked.
    pub fn frame_count(&self) -> usize {
        self.frames.lock().expect("tracker lock poisoned").len()
    }
}

// ── Tests ────────────────────────────────────────────────────────

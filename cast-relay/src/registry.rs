//! The session registry: live sessions, frame fan-out, input routing.
//!
//! One registry task owns the set of authenticated sessions. Encoded
//! frames arrive on a channel from the frame producer; each is split
//! into pieces (5-byte prefix + payload) and fanned out to streaming
//! screen-capture sessions, paced by their acknowledgement settings.
//! Input reports are handed to the configured [`InputSink`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use cast_core::{
    CastError, FramePiece, InputReport, Message, MessageCode, OutboundSender, SessionType,
    StreamSettings,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Registry command channel depth.
pub const REGISTRY_DEPTH: usize = 256;

// ── Seams ────────────────────────────────────────────────────────

/// Receives input reports decoded from input-capture sessions.
/// Injection into a real input stack lives behind this seam.
#[async_trait]
pub trait InputSink: Send + Sync {
    async fn input(&self, session_id: u64, report: InputReport);
    async fn idle(&self, session_id: u64);
}

/// An `InputSink` that just logs what arrives.
pub struct LoggingInputSink;

#[async_trait]
impl InputSink for LoggingInputSink {
    async fn input(&self, session_id: u64, report: InputReport) {
        info!(
            session_id,
            down = report.down.bits(),
            up = report.up.bits(),
            circle = ?(report.circle_x, report.circle_y),
            "input report"
        );
    }

    async fn idle(&self, session_id: u64) {
        debug!(session_id, "idle input");
    }
}

/// Produces encoded frames for distribution. Capture and encoding live
/// behind this seam; the registry only sees finished frame bytes.
#[async_trait]
pub trait FrameProducer: Send {
    /// The next encoded frame, or `None` when the producer is done.
    async fn next_frame(&mut self) -> Option<Bytes>;
}

/// Drive a producer into the registry's frame channel until either end
/// shuts down.
pub async fn pump_frames(mut producer: impl FrameProducer, tx: mpsc::Sender<Bytes>) {
    while let Some(frame) = producer.next_frame().await {
        if tx.send(frame).await.is_err() {
            break;
        }
    }
}

// ── RegistryCommand ──────────────────────────────────────────────

/// Session lifecycle and traffic notifications sent to the registry.
#[derive(Debug)]
pub enum RegistryCommand {
    /// A session passed authentication.
    Register {
        id: u64,
        session_type: SessionType,
        outbound: OutboundSender,
        settings: StreamSettings,
    },
    /// A session's connection is gone.
    Deregister { id: u64 },
    /// A screen-capture session asked for the stream to start.
    StreamStart { id: u64 },
    /// A screen-capture session asked for the stream to stop.
    StreamStop { id: u64 },
    /// A screen-capture session pushed new settings.
    Settings { id: u64, settings: StreamSettings },
    /// A screen-capture session acknowledged a received frame.
    FrameAcked { id: u64 },
    /// An input-capture session delivered a report.
    Input { id: u64, report: InputReport },
    /// An input-capture session delivered an idle report.
    InputIdle { id: u64 },
}

// ── Frame splitting ──────────────────────────────────────────────

/// Split an encoded frame into ready-to-send piece messages.
///
/// The piece index is a single byte, so a frame may span at most 256
/// pieces; a frame that would need more is refused rather than sent
/// truncated.
pub fn split_frame(
    frame_index: u32,
    frame: &Bytes,
    piece_size: usize,
) -> Result<Vec<Bytes>, CastError> {
    let piece_count = frame.len().div_ceil(piece_size.max(1));
    if piece_count > u8::MAX as usize + 1 {
        return Err(CastError::ContentTooLarge {
            size: frame.len(),
            max: piece_size * (u8::MAX as usize + 1),
        });
    }
    let mut pieces = Vec::with_capacity(piece_count);
    for (index, offset) in (0..frame.len()).step_by(piece_size.max(1)).enumerate() {
        let end = (offset + piece_size).min(frame.len());
        let piece = FramePiece::new(frame_index, index as u8, frame.slice(offset..end));
        let msg = Message::with_content(MessageCode::ScreenNewFrame, piece.encode())?;
        pieces.push(msg.encode());
    }
    Ok(pieces)
}

// ── SessionRegistry ──────────────────────────────────────────────

#[derive(Debug)]
struct RegisteredSession {
    outbound: OutboundSender,
    session_type: SessionType,
    streaming: bool,
    settings: StreamSettings,
    frame_acknowledged: bool,
    unacked_frames: u32,
}

/// Owns the live session set and distributes frames and input.
pub struct SessionRegistry {
    sessions: HashMap<u64, RegisteredSession>,
    next_frame_index: u32,
    piece_size: usize,
    input_sink: Arc<dyn InputSink>,
}

impl SessionRegistry {
    pub fn new(piece_size: usize, input_sink: Arc<dyn InputSink>) -> Self {
        Self {
            sessions: HashMap::new(),
            next_frame_index: 0,
            piece_size,
            input_sink,
        }
    }

    /// Process commands and frames until both channels close.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<RegistryCommand>,
        mut frames: mpsc::Receiver<Bytes>,
    ) {
        loop {
            tokio::select! {
                maybe = commands.recv() => match maybe {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                maybe = frames.recv() => match maybe {
                    Some(frame) => self.distribute(frame).await,
                    None => break,
                },
            }
        }
        info!("registry shutting down");
    }

    async fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register {
                id,
                session_type,
                outbound,
                settings,
            } => {
                info!(id, %session_type, "session registered");
                self.sessions.insert(
                    id,
                    RegisteredSession {
                        outbound,
                        session_type,
                        streaming: false,
                        settings,
                        frame_acknowledged: true,
                        unacked_frames: 0,
                    },
                );
            }
            RegistryCommand::Deregister { id } => {
                if self.sessions.remove(&id).is_some() {
                    info!(id, "session deregistered");
                }
            }
            RegistryCommand::StreamStart { id } => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.streaming = true;
                    info!(id, "stream started");
                }
            }
            RegistryCommand::StreamStop { id } => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.streaming = false;
                    info!(id, "stream stopped");
                }
            }
            RegistryCommand::Settings { id, settings } => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.settings = settings;
                    debug!(id, ?settings, "settings updated");
                }
            }
            RegistryCommand::FrameAcked { id } => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.frame_acknowledged = true;
                    session.unacked_frames = 0;
                }
            }
            RegistryCommand::Input { id, report } => {
                self.input_sink.input(id, report).await;
            }
            RegistryCommand::InputIdle { id } => {
                self.input_sink.idle(id).await;
            }
        }
    }

    /// Fan one encoded frame out to every eligible screen session.
    async fn distribute(&mut self, frame: Bytes) {
        let frame_index = self.next_frame_index;
        self.next_frame_index = self.next_frame_index.wrapping_add(1);

        let pieces = match split_frame(frame_index, &frame, self.piece_size) {
            Ok(pieces) => pieces,
            Err(e) => {
                warn!(frame_index, "dropping undeliverable frame: {e}");
                return;
            }
        };

        let mut dead = Vec::new();
        for (&id, session) in self.sessions.iter_mut() {
            if session.session_type != SessionType::ScreenCapture || !session.streaming {
                continue;
            }
            if session.settings.wait_for_received_frame
                && !session.frame_acknowledged
                && session.unacked_frames >= session.settings.smooth_step_frames
            {
                // pacing: the viewer has fallen behind, skip this frame
                continue;
            }
            let mut failed = false;
            for piece in &pieces {
                if session.outbound.send(piece.clone()).await.is_err() {
                    failed = true;
                    break;
                }
            }
            if failed {
                dead.push(id);
                continue;
            }
            session.frame_acknowledged = false;
            session.unacked_frames += 1;
        }
        for id in dead {
            self.sessions.remove(&id);
            info!(id, "session dropped mid-frame");
        }
    }

    /// Number of registered sessions (tests).
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! The client-role connection session.
//!
//! One task per connection owns the whole read path: transport events
//! arrive on one channel, control-plane commands (start stream, change
//! settings, send input) on another, and the task processes exactly one
//! header/body cycle at a time. Outbound control calls each build and
//! send exactly one message — no queueing or batching.
//!
//! On connect the session sends its type's authentication request and
//! interprets the first 9-byte read as the handshake result. Anything
//! other than the success code tears the connection down; there is no
//! retry at this layer.

use std::ops::ControlFlow;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::buffer::ConnectionBuffer;
use crate::error::CastError;
use crate::header::MessageHeader;
use crate::message::{Message, MessageCode, SessionType};
use crate::network::{Connection, OutboundSender, TransportEvent};
use crate::protocol::input::InputReport;
use crate::protocol::screen::{FramePiece, StreamSettings};
use crate::session::state::{ReadPhase, SessionState};
use crate::tracker::FramePieceTracker;

/// Control-plane command channel depth.
const COMMAND_DEPTH: usize = 32;

/// Session event channel depth.
const EVENT_DEPTH: usize = 64;

// ── SessionEvent ─────────────────────────────────────────────────

/// Notifications the session surfaces to the owning application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The handshake succeeded. Fires exactly once per connection.
    Authenticated,
    /// A frame piece was folded into the tracker.
    PieceStored { frame_index: u32, piece_index: u8 },
    /// The session is gone: teardown, transport loss, or auth failure.
    Closed,
}

// ── SessionCommand ───────────────────────────────────────────────

/// Control-plane operations issued by the owning application.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Ask the relay to start streaming frames.
    StartStream,
    /// Stop the stream and end the session.
    StopStream,
    /// Push new stream settings to the relay.
    ChangeSettings(StreamSettings),
    /// Begin forwarding input reports.
    StartInput,
    /// Stop forwarding input and end the session.
    StopInput,
    /// Send one input report. Ignored before `StartInput`.
    SendInput(InputReport),
    /// Send an idle input report.
    SendIdleInput,
    /// Tear the session down.
    Close,
}

// ── SessionHandle ────────────────────────────────────────────────

/// The application's side of a running [`ClientSession`].
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    events: mpsc::Receiver<SessionEvent>,
}

impl SessionHandle {
    /// Issue a control-plane command.
    pub async fn command(&self, cmd: SessionCommand) -> Result<(), CastError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| CastError::SessionClosed)
    }

    /// Next session event; `None` once the session task is gone.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// A clonable command sender, for driving the session from a task
    /// that does not own the handle.
    pub fn commander(&self) -> mpsc::Sender<SessionCommand> {
        self.commands.clone()
    }

    pub async fn start_stream(&self) -> Result<(), CastError> {
        self.command(SessionCommand::StartStream).await
    }

    pub async fn stop_stream(&self) -> Result<(), CastError> {
        self.command(SessionCommand::StopStream).await
    }

    pub async fn change_settings(&self, settings: StreamSettings) -> Result<(), CastError> {
        self.command(SessionCommand::ChangeSettings(settings)).await
    }

    pub async fn start_input(&self) -> Result<(), CastError> {
        self.command(SessionCommand::StartInput).await
    }

    pub async fn send_input(&self, report: InputReport) -> Result<(), CastError> {
        self.command(SessionCommand::SendInput(report)).await
    }

    pub async fn send_idle_input(&self) -> Result<(), CastError> {
        self.command(SessionCommand::SendIdleInput).await
    }

    pub async fn close(&self) -> Result<(), CastError> {
        self.command(SessionCommand::Close).await
    }
}

// ── SessionEngine ────────────────────────────────────────────────

/// The state-machine half of a session, free of any select loop so the
/// read path stays unit-testable without sockets.
struct SessionEngine {
    state: SessionState,
    buffer: ConnectionBuffer,
    outbound: OutboundSender,
    events: mpsc::Sender<SessionEvent>,
    tracker: Arc<FramePieceTracker>,
    cancel: CancellationToken,
}

impl SessionEngine {
    /// The socket is up: open with this session type's auth request and
    /// wait for the 9-byte handshake result.
    async fn on_connected(&mut self) -> Result<(), CastError> {
        let auth = Message::header_only(self.state.session_type().auth_code());
        self.outbound.send(auth.encode()).await?;
        Ok(())
    }

    /// Fold a raw chunk into the buffer and drain every exactly-sized
    /// read that is now available, in order.
    async fn handle_data(&mut self, chunk: &[u8]) -> Result<(), CastError> {
        self.buffer.feed(chunk);
        while let Some(bytes) = self.buffer.try_extract(self.state.expected()) {
            self.process_read(bytes).await?;
        }
        Ok(())
    }

    async fn process_read(&mut self, bytes: Bytes) -> Result<(), CastError> {
        match self.state.phase() {
            ReadPhase::AuthResult => {
                let header = MessageHeader::decode(&bytes)
                    .map_err(|_| CastError::AuthenticationFailed)?;
                if header.message_code() != Some(MessageCode::AuthSuccess) {
                    return Err(CastError::AuthenticationFailed);
                }
                self.state.mark_authenticated();
                let _ = self.events.send(SessionEvent::Authenticated).await;
                Ok(())
            }
            ReadPhase::Header => {
                match MessageHeader::decode(&bytes) {
                    Ok(header) => self.state.expect_body(header),
                    Err(e) => {
                        // malformed frame: drop it and restart the cycle
                        trace!("dropping malformed header: {e}");
                        self.state.expect_header();
                    }
                }
                Ok(())
            }
            ReadPhase::Body => {
                let result = match self.state.take_pending() {
                    Some(header) if bytes.len() == header.content_length() as usize => {
                        self.dispatch(header, bytes).await
                    }
                    Some(header) => {
                        trace!(
                            declared = header.content_length(),
                            delivered = bytes.len(),
                            "discarding body with mismatched size"
                        );
                        Ok(())
                    }
                    // no pending header: useless data, skip it
                    None => Ok(()),
                };
                self.state.expect_header();
                result
            }
        }
    }

    /// Dispatch a completed message to the session-type handler.
    async fn dispatch(&mut self, header: MessageHeader, body: Bytes) -> Result<(), CastError> {
        match self.state.session_type() {
            SessionType::ScreenCapture => self.dispatch_screen(header, body).await,
            // extension points: nothing consumes these streams yet
            SessionType::Movie | SessionType::InputCapture => {
                trace!(code = header.code(), "message without handler ignored");
                Ok(())
            }
        }
    }

    async fn dispatch_screen(&mut self, header: MessageHeader, body: Bytes) -> Result<(), CastError> {
        match header.message_code() {
            Some(MessageCode::ScreenNewFrame) => {
                // receipt ack goes out before any piece processing
                let ack = Message::header_only(MessageCode::ScreenFrameReceived);
                self.outbound.send(ack.encode()).await?;

                match FramePiece::parse(&body) {
                    Ok(piece) => {
                        let frame_index = piece.frame_index;
                        let piece_index = piece.piece_index;
                        self.tracker.submit(piece);
                        let _ = self
                            .events
                            .send(SessionEvent::PieceStored {
                                frame_index,
                                piece_index,
                            })
                            .await;
                    }
                    Err(e) => warn!("unusable frame piece: {e}"),
                }
                Ok(())
            }
            Some(MessageCode::AudioNewFrame) | Some(MessageCode::AudioFrameReceived) => {
                trace!("audio frames disabled, ignoring");
                Ok(())
            }
            Some(other) => {
                trace!(%other, "screen session has no handler for code");
                Ok(())
            }
            None => {
                trace!(code = header.code(), "unknown code ignored");
                Ok(())
            }
        }
    }

    async fn handle_command(
        &mut self,
        cmd: SessionCommand,
    ) -> Result<ControlFlow<()>, CastError> {
        match cmd {
            SessionCommand::StartStream => {
                self.send(Message::header_only(MessageCode::ScreenStart))
                    .await?;
                self.state.set_streaming(true);
                Ok(ControlFlow::Continue(()))
            }
            SessionCommand::StopStream => {
                if !self.state.is_streaming() {
                    return Ok(ControlFlow::Continue(()));
                }
                self.send(Message::header_only(MessageCode::ScreenStop))
                    .await?;
                self.state.set_streaming(false);
                // stopping the stream ends the session
                Ok(ControlFlow::Break(()))
            }
            SessionCommand::ChangeSettings(settings) => {
                let body = Bytes::copy_from_slice(&settings.encode());
                self.send(Message::with_content(
                    MessageCode::ScreenChangeSetting,
                    body,
                )?)
                .await?;
                Ok(ControlFlow::Continue(()))
            }
            SessionCommand::StartInput => {
                if !self.state.input_started() {
                    self.send(Message::header_only(MessageCode::InputStart))
                        .await?;
                    self.state.set_input_started(true);
                }
                Ok(ControlFlow::Continue(()))
            }
            SessionCommand::StopInput => {
                if !self.state.input_started() {
                    return Ok(ControlFlow::Continue(()));
                }
                self.send(Message::header_only(MessageCode::InputStop))
                    .await?;
                self.state.set_input_started(false);
                Ok(ControlFlow::Break(()))
            }
            SessionCommand::SendInput(report) => {
                if self.state.input_started() {
                    let body = Bytes::copy_from_slice(&report.encode());
                    self.send(Message::with_content(MessageCode::InputSend, body)?)
                        .await?;
                }
                Ok(ControlFlow::Continue(()))
            }
            SessionCommand::SendIdleInput => {
                self.send(Message::header_only(MessageCode::InputSendIdle))
                    .await?;
                Ok(ControlFlow::Continue(()))
            }
            SessionCommand::Close => Ok(ControlFlow::Break(())),
        }
    }

    async fn send(&self, msg: Message) -> Result<(), CastError> {
        self.outbound.send(msg.encode()).await.map_err(Into::into)
    }

    /// Stop the transport, drop authentication, notify the owner once.
    async fn teardown(&mut self) {
        self.cancel.cancel();
        self.state.reset_for_teardown();
        let _ = self.events.send(SessionEvent::Closed).await;
    }
}

// ── ClientSession ────────────────────────────────────────────────

/// A client-role session bound to one [`Connection`].
///
/// Construct with [`ClientSession::new`], then `tokio::spawn(session.run())`
/// and drive it through the returned [`SessionHandle`].
pub struct ClientSession {
    engine: SessionEngine,
    transport: mpsc::Receiver<TransportEvent>,
    commands: mpsc::Receiver<SessionCommand>,
}

impl ClientSession {
    pub fn new(
        session_type: SessionType,
        connection: Connection,
        tracker: Arc<FramePieceTracker>,
    ) -> (Self, SessionHandle) {
        let (outbound, transport, cancel) = connection.into_parts();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_DEPTH);
        let (event_tx, event_rx) = mpsc::channel(EVENT_DEPTH);

        let session = Self {
            engine: SessionEngine {
                state: SessionState::new(session_type),
                buffer: ConnectionBuffer::new(),
                outbound,
                events: event_tx,
                tracker,
                cancel,
            },
            transport,
            commands: command_rx,
        };
        let handle = SessionHandle {
            commands: command_tx,
            events: event_rx,
        };
        (session, handle)
    }

    /// Process transport events and commands until teardown.
    pub async fn run(self) {
        let ClientSession {
            mut engine,
            mut transport,
            mut commands,
        } = self;

        loop {
            tokio::select! {
                maybe = transport.recv() => match maybe {
                    Some(TransportEvent::Connected) => {
                        if engine.on_connected().await.is_err() {
                            engine.teardown().await;
                            break;
                        }
                    }
                    Some(TransportEvent::Data(chunk)) => {
                        if let Err(e) = engine.handle_data(&chunk).await {
                            debug!("session error: {e}");
                            engine.teardown().await;
                            break;
                        }
                    }
                    Some(TransportEvent::Closed) | None => {
                        engine.teardown().await;
                        break;
                    }
                },
                maybe = commands.recv() => match maybe {
                    Some(cmd) => match engine.handle_command(cmd).await {
                        Ok(ControlFlow::Continue(())) => {}
                        Ok(ControlFlow::Break(())) | Err(_) => {
                            engine.teardown().await;
                            break;
                        }
                    },
                    // handle dropped: nothing left to drive the session
                    None => {
                        engine.teardown().await;
                        break;
                    }
                },
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HEADER_SIZE;

    struct Rig {
        engine: SessionEngine,
        outbound_rx: mpsc::Receiver<Bytes>,
        event_rx: mpsc::Receiver<SessionEvent>,
        tracker: Arc<FramePieceTracker>,
    }

    fn rig(session_type: SessionType) -> Rig {
        let (outbound, outbound_rx) = mpsc::channel(COMMAND_DEPTH);
        let (events, event_rx) = mpsc::channel(EVENT_DEPTH);
        let tracker = Arc::new(FramePieceTracker::new());
        let engine = SessionEngine {
            state: SessionState::new(session_type),
            buffer: ConnectionBuffer::with_capacity(4096),
            outbound,
            events,
            tracker: Arc::clone(&tracker),
            cancel: CancellationToken::new(),
        };
        Rig {
            engine,
            outbound_rx,
            event_rx,
            tracker,
        }
    }

    fn auth_success_bytes() -> Bytes {
        Message::header_only(MessageCode::AuthSuccess).encode()
    }

    #[tokio::test]
    async fn connect_sends_auth_request() {
        let mut rig = rig(SessionType::ScreenCapture);
        rig.engine.on_connected().await.unwrap();

        let sent = rig.outbound_rx.recv().await.unwrap();
        assert_eq!(sent.len(), HEADER_SIZE);
        assert_eq!(sent[0], MessageCode::AuthScreenCapture as u8);
    }

    #[tokio::test]
    async fn auth_success_fires_exactly_once() {
        let mut rig = rig(SessionType::ScreenCapture);
        rig.engine.handle_data(&auth_success_bytes()).await.unwrap();

        assert_eq!(rig.event_rx.try_recv().unwrap(), SessionEvent::Authenticated);
        assert!(rig.event_rx.try_recv().is_err());
        assert!(rig.engine.state.is_authenticated());
    }

    #[tokio::test]
    async fn wrong_auth_code_is_fatal() {
        let mut rig = rig(SessionType::InputCapture);
        let failed = Message::header_only(MessageCode::AuthFailed).encode();
        let result = rig.engine.handle_data(&failed).await;

        assert!(matches!(result, Err(CastError::AuthenticationFailed)));
        assert!(!rig.engine.state.is_authenticated());
        assert!(rig.event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn nothing_dispatched_before_auth() {
        let mut rig = rig(SessionType::ScreenCapture);
        // a frame-piece message instead of a handshake result
        let piece_body = FramePiece::new(1, 0, Bytes::from_static(b"xx")).encode();
        let msg = Message::with_content(MessageCode::ScreenNewFrame, piece_body).unwrap();
        let result = rig.engine.handle_data(&msg.encode()).await;

        assert!(matches!(result, Err(CastError::AuthenticationFailed)));
        assert_eq!(rig.tracker.frame_count(), 0);
    }

    #[tokio::test]
    async fn new_frame_acks_before_piece_is_tracked() {
        let mut rig = rig(SessionType::ScreenCapture);
        rig.engine.handle_data(&auth_success_bytes()).await.unwrap();

        let piece = FramePiece::new(7, 1, Bytes::from_static(b"payload"));
        let msg = Message::with_content(MessageCode::ScreenNewFrame, piece.encode()).unwrap();
        rig.engine.handle_data(&msg.encode()).await.unwrap();

        let ack = rig.outbound_rx.recv().await.unwrap();
        assert_eq!(ack[0], MessageCode::ScreenFrameReceived as u8);
        assert_eq!(ack.len(), HEADER_SIZE);

        let snap = rig.tracker.snapshot(7).unwrap();
        assert_eq!(snap.piece_indices, vec![1]);
        assert_eq!(snap.total_bytes, 7);
        assert!(matches!(
            rig.event_rx.try_recv(),
            Ok(SessionEvent::Authenticated)
        ));
        assert_eq!(
            rig.event_rx.try_recv().unwrap(),
            SessionEvent::PieceStored {
                frame_index: 7,
                piece_index: 1
            }
        );
    }

    #[tokio::test]
    async fn header_only_new_frame_still_acks() {
        let mut rig = rig(SessionType::ScreenCapture);
        rig.engine.handle_data(&auth_success_bytes()).await.unwrap();

        let msg = Message::header_only(MessageCode::ScreenNewFrame);
        rig.engine.handle_data(&msg.encode()).await.unwrap();

        // ack goes out even though the empty body holds no piece
        let ack = rig.outbound_rx.recv().await.unwrap();
        assert_eq!(ack[0], MessageCode::ScreenFrameReceived as u8);
        assert_eq!(rig.tracker.frame_count(), 0);
    }

    #[tokio::test]
    async fn split_delivery_dispatches_once() {
        let mut rig = rig(SessionType::ScreenCapture);
        rig.engine.handle_data(&auth_success_bytes()).await.unwrap();

        let piece = FramePiece::new(3, 0, Bytes::from(vec![0xEE; 11]));
        let wire = Message::with_content(MessageCode::ScreenNewFrame, piece.encode())
            .unwrap()
            .encode();

        // header split [3][6], then the body in two runs
        rig.engine.handle_data(&wire[0..3]).await.unwrap();
        rig.engine.handle_data(&wire[3..9]).await.unwrap();
        assert_eq!(rig.tracker.frame_count(), 0);
        rig.engine.handle_data(&wire[9..14]).await.unwrap();
        rig.engine.handle_data(&wire[14..]).await.unwrap();

        let snap = rig.tracker.snapshot(3).unwrap();
        assert_eq!(snap.piece_count(), 1);
        assert_eq!(snap.total_bytes, 11);
        assert_eq!(rig.outbound_rx.recv().await.unwrap()[0], 16);
        assert!(rig.outbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_header_drops_and_cycle_recovers() {
        let mut rig = rig(SessionType::ScreenCapture);
        rig.engine.handle_data(&auth_success_bytes()).await.unwrap();

        // impossible declared length: dropped, no body requested
        let mut bad = [0u8; HEADER_SIZE];
        bad[0] = MessageCode::ScreenNewFrame as u8;
        bad[1..5].copy_from_slice(&u32::MAX.to_le_bytes());
        rig.engine.handle_data(&bad).await.unwrap();
        assert_eq!(rig.engine.state.phase(), ReadPhase::Header);

        // the next well-formed message still dispatches
        let piece = FramePiece::new(1, 0, Bytes::from_static(b"ok"));
        let msg = Message::with_content(MessageCode::ScreenNewFrame, piece.encode()).unwrap();
        rig.engine.handle_data(&msg.encode()).await.unwrap();
        assert_eq!(rig.tracker.snapshot(1).unwrap().total_bytes, 2);
    }

    #[tokio::test]
    async fn unknown_code_is_a_no_op() {
        let mut rig = rig(SessionType::ScreenCapture);
        rig.engine.handle_data(&auth_success_bytes()).await.unwrap();

        let mut wire = Vec::new();
        wire.extend_from_slice(&MessageHeader::new(99, 4).to_bytes());
        wire.extend_from_slice(&[1, 2, 3, 4]);
        rig.engine.handle_data(&wire).await.unwrap();

        assert_eq!(rig.engine.state.phase(), ReadPhase::Header);
        assert_eq!(rig.tracker.frame_count(), 0);
    }

    #[tokio::test]
    async fn input_commands_respect_start_gate() {
        let mut rig = rig(SessionType::InputCapture);
        rig.engine.handle_data(&auth_success_bytes()).await.unwrap();

        // before StartInput, reports are ignored
        rig.engine
            .handle_command(SessionCommand::SendInput(InputReport::idle()))
            .await
            .unwrap();
        assert!(rig.outbound_rx.try_recv().is_err());

        rig.engine
            .handle_command(SessionCommand::StartInput)
            .await
            .unwrap();
        let start = rig.outbound_rx.recv().await.unwrap();
        assert_eq!(start[0], MessageCode::InputStart as u8);

        rig.engine
            .handle_command(SessionCommand::SendInput(InputReport::idle()))
            .await
            .unwrap();
        let sent = rig.outbound_rx.recv().await.unwrap();
        assert_eq!(sent[0], MessageCode::InputSend as u8);
        assert_eq!(sent.len(), HEADER_SIZE + 16);
    }

    #[tokio::test]
    async fn stop_stream_ends_session() {
        let mut rig = rig(SessionType::ScreenCapture);
        rig.engine.handle_data(&auth_success_bytes()).await.unwrap();

        // stop without start is a no-op that keeps the session alive
        let flow = rig
            .engine
            .handle_command(SessionCommand::StopStream)
            .await
            .unwrap();
        assert_eq!(flow, ControlFlow::Continue(()));

        rig.engine
            .handle_command(SessionCommand::StartStream)
            .await
            .unwrap();
        assert!(rig.engine.state.is_streaming());

        let flow = rig
            .engine
            .handle_command(SessionCommand::StopStream)
            .await
            .unwrap();
        assert_eq!(flow, ControlFlow::Break(()));
        assert!(!rig.engine.state.is_streaming());
    }

    #[tokio::test]
    async fn change_settings_sends_13_byte_body() {
        let mut rig = rig(SessionType::ScreenCapture);
        rig.engine.handle_data(&auth_success_bytes()).await.unwrap();

        rig.engine
            .handle_command(SessionCommand::ChangeSettings(
                StreamSettings::new().with_quality(50),
            ))
            .await
            .unwrap();
        let sent = rig.outbound_rx.recv().await.unwrap();
        assert_eq!(sent[0], MessageCode::ScreenChangeSetting as u8);
        assert_eq!(sent.len(), HEADER_SIZE + 13);

        let settings = StreamSettings::decode(&sent[HEADER_SIZE..]).unwrap();
        assert_eq!(settings.source_quality, 50);
    }

    #[tokio::test]
    async fn teardown_emits_closed_and_resets() {
        let mut rig = rig(SessionType::ScreenCapture);
        rig.engine.handle_data(&auth_success_bytes()).await.unwrap();
        let _ = rig.event_rx.try_recv();

        rig.engine.teardown().await;
        assert_eq!(rig.event_rx.try_recv().unwrap(), SessionEvent::Closed);
        assert!(!rig.engine.state.is_authenticated());
        assert!(rig.engine.cancel.is_cancelled());
    }
}

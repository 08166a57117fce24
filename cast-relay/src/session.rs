//! The relay-side connection session.
//!
//! Mirror image of the client machine: the first 9-byte read must be an
//! authentication *request* header (movie / screen-capture / input), and
//! the relay answers with the success or failure result. Everything
//! after the gate is the same header/body cycle over the same
//! demultiplexer, dispatched by the session type the connection
//! authenticated for.

use std::time::Duration;

use bytes::Bytes;
use cast_core::{
    CastError, Connection, ConnectionBuffer, InputReport, Message, MessageCode, MessageHeader,
    OutboundSender, SessionType, StreamSettings, TransportEvent,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::registry::RegistryCommand;

// ── RelayEngine ──────────────────────────────────────────────────

/// What the next exactly-sized read means to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadPhase {
    /// Pre-authentication: the next 9 bytes are the auth request header.
    AuthRequest,
    /// The next 9 bytes are a message header.
    Header,
    /// The next read completes the pending message's body.
    Body,
}

/// State-machine half of a relay session; no select loop, so the read
/// path is unit-testable without sockets.
struct RelayEngine {
    id: u64,
    session_type: Option<SessionType>,
    authenticated: bool,
    phase: ReadPhase,
    expected: usize,
    pending: Option<MessageHeader>,
    buffer: ConnectionBuffer,
    outbound: OutboundSender,
    registry: mpsc::Sender<RegistryCommand>,
    default_settings: StreamSettings,
    cancel: CancellationToken,
}

impl RelayEngine {
    async fn handle_data(&mut self, chunk: &[u8]) -> Result<(), CastError> {
        self.buffer.feed(chunk);
        while let Some(bytes) = self.buffer.try_extract(self.expected) {
            self.process_read(bytes).await?;
        }
        Ok(())
    }

    async fn process_read(&mut self, bytes: Bytes) -> Result<(), CastError> {
        match self.phase {
            ReadPhase::AuthRequest => self.process_auth_request(&bytes).await,
            ReadPhase::Header => {
                match MessageHeader::decode(&bytes) {
                    Ok(header) => {
                        self.expected = header.content_length() as usize;
                        self.pending = Some(header);
                        self.phase = ReadPhase::Body;
                    }
                    Err(e) => {
                        // malformed frame: drop it and restart the cycle
                        trace!(id = self.id, "dropping malformed header: {e}");
                        self.expect_header();
                    }
                }
                Ok(())
            }
            ReadPhase::Body => {
                let result = match self.pending.take() {
                    Some(header) if bytes.len() == header.content_length() as usize => {
                        self.dispatch(header, bytes).await
                    }
                    Some(header) => {
                        trace!(
                            id = self.id,
                            declared = header.content_length(),
                            delivered = bytes.len(),
                            "discarding body with mismatched size"
                        );
                        Ok(())
                    }
                    None => Ok(()),
                };
                self.expect_header();
                result
            }
        }
    }

    /// Gate: the opening header must be an auth request with an empty
    /// body. Answer success and register, or answer failure and bail.
    async fn process_auth_request(&mut self, bytes: &[u8]) -> Result<(), CastError> {
        let verdict = MessageHeader::decode(bytes)
            .ok()
            .filter(|header| header.content_length() == 0)
            .and_then(|header| header.message_code())
            .and_then(SessionType::from_auth_code);

        match verdict {
            Some(session_type) => {
                self.outbound
                    .send(Message::header_only(MessageCode::AuthSuccess).encode())
                    .await?;
                self.session_type = Some(session_type);
                self.authenticated = true;
                self.expect_header();
                info!(id = self.id, %session_type, "session authenticated");

                self.registry
                    .send(RegistryCommand::Register {
                        id: self.id,
                        session_type,
                        outbound: self.outbound.clone(),
                        settings: self.default_settings,
                    })
                    .await?;
                Ok(())
            }
            None => {
                warn!(id = self.id, "rejecting unauthenticated connection");
                let _ = self
                    .outbound
                    .send(Message::header_only(MessageCode::AuthFailed).encode())
                    .await;
                Err(CastError::AuthenticationFailed)
            }
        }
    }

    async fn dispatch(&mut self, header: MessageHeader, body: Bytes) -> Result<(), CastError> {
        let session_type = match self.session_type {
            Some(ty) => ty,
            None => return Ok(()), // unreachable past the gate
        };
        match session_type {
            SessionType::ScreenCapture => self.dispatch_screen(header, body).await,
            SessionType::InputCapture => self.dispatch_input(header, body).await,
            // extension point: movie sessions carry no inbound traffic yet
            SessionType::Movie => {
                trace!(id = self.id, code = header.code(), "movie message ignored");
                Ok(())
            }
        }
    }

    async fn dispatch_screen(&mut self, header: MessageHeader, body: Bytes) -> Result<(), CastError> {
        match header.message_code() {
            Some(MessageCode::ScreenStart) => {
                self.registry
                    .send(RegistryCommand::StreamStart { id: self.id })
                    .await?;
                Ok(())
            }
            Some(MessageCode::ScreenStop) => {
                self.registry
                    .send(RegistryCommand::StreamStop { id: self.id })
                    .await?;
                Ok(())
            }
            Some(MessageCode::ScreenChangeSetting) => {
                match StreamSettings::decode(&body) {
                    Ok(settings) => {
                        self.registry
                            .send(RegistryCommand::Settings {
                                id: self.id,
                                settings,
                            })
                            .await?;
                    }
                    Err(e) => warn!(id = self.id, "unusable settings body: {e}"),
                }
                Ok(())
            }
            Some(MessageCode::ScreenFrameReceived) => {
                self.registry
                    .send(RegistryCommand::FrameAcked { id: self.id })
                    .await?;
                Ok(())
            }
            Some(MessageCode::AudioNewFrame) | Some(MessageCode::AudioFrameReceived) => {
                trace!(id = self.id, "audio frames disabled, ignoring");
                Ok(())
            }
            Some(other) => {
                trace!(id = self.id, %other, "screen session has no handler for code");
                Ok(())
            }
            None => {
                trace!(id = self.id, code = header.code(), "unknown code ignored");
                Ok(())
            }
        }
    }

    async fn dispatch_input(&mut self, header: MessageHeader, body: Bytes) -> Result<(), CastError> {
        match header.message_code() {
            Some(MessageCode::InputSend) => {
                match InputReport::decode(&body) {
                    Ok(report) => {
                        self.registry
                            .send(RegistryCommand::Input {
                                id: self.id,
                                report,
                            })
                            .await?;
                    }
                    Err(e) => warn!(id = self.id, "unusable input body: {e}"),
                }
                Ok(())
            }
            Some(MessageCode::InputSendIdle) => {
                self.registry
                    .send(RegistryCommand::InputIdle { id: self.id })
                    .await?;
                Ok(())
            }
            Some(MessageCode::InputStart) | Some(MessageCode::InputStop) => {
                debug!(id = self.id, code = header.code(), "input session toggled");
                Ok(())
            }
            _ => {
                trace!(id = self.id, code = header.code(), "unknown code ignored");
                Ok(())
            }
        }
    }

    fn expect_header(&mut self) {
        self.phase = ReadPhase::Header;
        self.expected = cast_core::HEADER_SIZE;
        self.pending = None;
    }

    async fn teardown(&mut self) {
        self.cancel.cancel();
        self.authenticated = false;
        if self.session_type.is_some() {
            let _ = self
                .registry
                .send(RegistryCommand::Deregister { id: self.id })
                .await;
        }
    }
}

// ── RelaySession ─────────────────────────────────────────────────

/// One accepted connection on the relay.
pub struct RelaySession {
    engine: RelayEngine,
    transport: mpsc::Receiver<TransportEvent>,
    idle_timeout: Option<Duration>,
}

impl RelaySession {
    pub fn new(
        id: u64,
        connection: Connection,
        registry: mpsc::Sender<RegistryCommand>,
        default_settings: StreamSettings,
        idle_timeout: Option<Duration>,
    ) -> Self {
        let (outbound, transport, cancel) = connection.into_parts();
        Self {
            engine: RelayEngine {
                id,
                session_type: None,
                authenticated: false,
                phase: ReadPhase::AuthRequest,
                expected: cast_core::HEADER_SIZE,
                pending: None,
                buffer: ConnectionBuffer::new(),
                outbound,
                registry,
                default_settings,
                cancel,
            },
            transport,
            idle_timeout,
        }
    }

    /// Process transport events until the peer goes away, an error
    /// proves fatal, or the idle timeout (when configured) fires.
    pub async fn run(self) {
        let RelaySession {
            mut engine,
            mut transport,
            idle_timeout,
        } = self;

        loop {
            let maybe = match idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, transport.recv()).await {
                    Ok(event) => event,
                    Err(_) => {
                        info!(id = engine.id, "idle timeout, dropping connection");
                        break;
                    }
                },
                None => transport.recv().await,
            };
            match maybe {
                Some(TransportEvent::Connected) => {}
                Some(TransportEvent::Data(chunk)) => {
                    if let Err(e) = engine.handle_data(&chunk).await {
                        debug!(id = engine.id, "session error: {e}");
                        break;
                    }
                }
                Some(TransportEvent::Closed) | None => break,
            }
        }
        engine.teardown().await;
    }
}

// ── Tests ────────────────────────────────────────────────────────

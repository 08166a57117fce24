//! Managed TCP connection with background reader/writer tasks.
//!
//! The transport surface is deliberately narrow: connect, send, stop,
//! and an event stream carrying connected/data/closed notifications.
//! Raw bytes go out and raw chunks come in — framing is the session's
//! concern, which always knows how many bytes it is waiting for.

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CastError;

/// Read chunk size for the background reader.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Channel depth between the transport tasks and the session.
const CHANNEL_DEPTH: usize = 100;

/// Outbound half of a connection, cheap to clone.
pub type OutboundSender = mpsc::Sender<Bytes>;

// ── TransportEvent ───────────────────────────────────────────────

/// Notifications delivered from the transport to the owning session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The socket is up; emitted once before any data.
    Connected,
    /// A run of raw bytes, chunked however the kernel delivered them.
    Data(Bytes),
    /// The peer closed or the link failed; terminal.
    Closed,
}

// ── Connection ───────────────────────────────────────────────────

/// A cast connection over one TCP stream.
///
/// Two background tasks shuttle bytes: a writer draining the outbound
/// channel and a reader pushing [`TransportEvent`]s. Dropping the
/// `Connection` (or calling [`stop`](Connection::stop)) cancels both.
#[derive(Debug)]
pub struct Connection {
    tx: OutboundSender,
    rx: mpsc::Receiver<TransportEvent>,
    cancel: CancellationToken,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        let (mut read_half, mut write_half) = stream.into_split();
        let cancel = CancellationToken::new();

        // Session -> Network
        let (user_tx, mut outbound_rx) = mpsc::channel::<Bytes>(CHANNEL_DEPTH);

        // Network -> Session
        let (event_tx, user_rx) = mpsc::channel::<TransportEvent>(CHANNEL_DEPTH);

        // Writer task
        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_cancel.cancelled() => {
                        // flush whatever was queued before the cancel
                        while let Ok(bytes) = outbound_rx.try_recv() {
                            if write_half.write_all(&bytes).await.is_err() {
                                break;
                            }
                        }
                        break;
                    }
                    maybe = outbound_rx.recv() => match maybe {
                        Some(bytes) => {
                            if let Err(e) = write_half.write_all(&bytes).await {
                                warn!("network write error: {e}");
                                break;
                            }
                        }
                        None => break, // session dropped its sender
                    },
                }
            }
            let _ = write_half.shutdown().await;
        });

        // Reader task
        let reader_cancel = cancel.clone();
        tokio::spawn(async move {
            // on-connected fires before any data
            if event_tx.send(TransportEvent::Connected).await.is_err() {
                return;
            }
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            loop {
                tokio::select! {
                    _ = reader_cancel.cancelled() => break,
                    result = read_half.read(&mut buf) => match result {
                        Ok(0) => {
                            debug!("peer closed connection");
                            break;
                        }
                        Ok(n) => {
                            let chunk = Bytes::copy_from_slice(&buf[..n]);
                            if event_tx.send(TransportEvent::Data(chunk)).await.is_err() {
                                return; // session rx was dropped
                            }
                        }
                        Err(e) => {
                            warn!("network read error: {e}");
                            break;
                        }
                    },
                }
            }
            let _ = event_tx.send(TransportEvent::Closed).await;
        });

        Self {
            tx: user_tx,
            rx: user_rx,
            cancel,
        }
    }

    /// Dial `info` and wrap the stream.
    pub async fn connect(info: &ConnectionInfo) -> Result<Self, CastError> {
        let stream = TcpStream::connect(info.to_socket_string()).await?;
        Ok(Self::new(stream))
    }

    /// Queue bytes for the writer task.
    pub async fn send(&self, bytes: Bytes) -> Result<(), CastError> {
        self.tx.send(bytes).await.map_err(Into::into)
    }

    /// Next transport event; `None` after both tasks are gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }

    /// A clonable handle to the outbound channel.
    pub fn sender(&self) -> OutboundSender {
        self.tx.clone()
    }

    /// Cancel both background tasks and close the socket.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Decompose into the pieces a session task needs.
    pub fn into_parts(
        self,
    ) -> (
        OutboundSender,
        mpsc::Receiver<TransportEvent>,
        CancellationToken,
    ) {
        (self.tx, self.rx, self.cancel)
    }
}

// ── ConnectionInfo ───────────────────────────────────────────────

/// Host/port pair for dialing a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn to_socket_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! The relay's accept loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cast_core::{CastError, Connection};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::registry::RegistryCommand;
use crate::session::RelaySession;

/// Accepts connections and spawns one [`RelaySession`] task each.
pub struct RelayServer {
    listener: TcpListener,
    config: RelayConfig,
    registry: mpsc::Sender<RegistryCommand>,
    active: Arc<AtomicUsize>,
    next_session_id: u64,
}

impl RelayServer {
    /// Bind the configured address.
    pub async fn bind(
        config: RelayConfig,
        registry: mpsc::Sender<RegistryCommand>,
    ) -> Result<Self, CastError> {
        let addr = format!("{}:{}", config.network.bind_host, config.network.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("listening on {addr}");
        Ok(Self {
            listener,
            config,
            registry,
            active: Arc::new(AtomicUsize::new(0)),
            next_session_id: 1,
        })
    }

    /// The bound local port (tests bind port 0).
    pub fn local_port(&self) -> Result<u16, CastError> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Accept until the listener fails.
    pub async fn run(mut self) {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("accept failed: {e}");
                    continue;
                }
            };
            if self.active.load(Ordering::Acquire) >= self.config.network.max_sessions {
                warn!(%peer, "refusing connection, session limit reached");
                drop(stream);
                continue;
            }

            let id = self.next_session_id;
            self.next_session_id += 1;
            info!(id, %peer, "connection accepted");

            let session = RelaySession::new(
                id,
                Connection::new(stream),
                self.registry.clone(),
                self.config.stream.defaults,
                self.config.idle_timeout(),
            );
            let active = Arc::clone(&self.active);
            active.fetch_add(1, Ordering::AcqRel);
            tokio::spawn(async move {
                session.run().await;
                active.fetch_sub(1, Ordering::AcqRel);
                info!(id, "session ended");
            });
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

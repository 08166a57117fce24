//! Configuration for the relay service.

use std::path::Path;

use cast_core::StreamSettings;
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Streaming settings.
    pub stream: StreamConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind the listener on.
    pub bind_host: String,
    /// TCP port to listen on.
    pub port: u16,
    /// Maximum concurrent sessions.
    pub max_sessions: usize,
    /// Per-connection idle timeout in seconds. 0 disables the timeout;
    /// the protocol itself never times a peer out.
    pub idle_timeout_secs: u64,
}

/// Streaming configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Maximum payload bytes per frame piece.
    pub piece_size: usize,
    /// Frames per second for the built-in pattern producer.
    pub frame_rate: u32,
    /// Pattern frame width in pixels.
    pub frame_width: u32,
    /// Pattern frame height in pixels.
    pub frame_height: u32,
    /// Settings applied to a viewer before it pushes its own.
    pub defaults: StreamSettings,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".into(),
            port: 1234,
            max_sessions: 16,
            idle_timeout_secs: 0,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            piece_size: 24 * 1024,
            frame_rate: 30,
            frame_width: 400,
            frame_height: 240,
            defaults: StreamSettings::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl RelayConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// The idle timeout as a `Duration`, if enabled.
    pub fn idle_timeout(&self) -> Option<std::time::Duration> {
        (self.network.idle_timeout_secs > 0)
            .then(|| std::time::Duration::from_secs(self.network.idle_timeout_secs))
    }
}

// ── Tests ────────────────────────────────────────────────────────

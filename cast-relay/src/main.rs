//! cast relay — entry point.
//!
//! ```text
//! cast-relay                    Run with defaults
//! cast-relay --config <path>    Load a custom config TOML
//! cast-relay --gen-config       Write default config to stdout
//! cast-relay --port <port>      Override the configured port
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cast_relay::config::RelayConfig;
use cast_relay::pattern::PatternProducer;
use cast_relay::registry::{LoggingInputSink, REGISTRY_DEPTH, SessionRegistry, pump_frames};
use cast_relay::server::RelayServer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "cast-relay", about = "cast relay — screen/input streaming server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "cast-relay.toml")]
    config: PathBuf,

    /// Override the configured listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&RelayConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = RelayConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.port = port;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();
    info!("starting relay");

    // Registry task: session set, frame fan-out, input routing.
    let (registry_tx, registry_rx) = mpsc::channel(REGISTRY_DEPTH);
    let (frame_tx, frame_rx) = mpsc::channel(8);
    let registry = SessionRegistry::new(config.stream.piece_size, Arc::new(LoggingInputSink));
    tokio::spawn(registry.run(registry_rx, frame_rx));

    // Frame producer: color bars until a capture stack sits behind the seam.
    let producer = PatternProducer::new(
        config.stream.frame_width,
        config.stream.frame_height,
        config.stream.frame_rate,
    );
    tokio::spawn(pump_frames(producer, frame_tx));

    let server = RelayServer::bind(config, registry_tx).await?;
    server.run().await;
    Ok(())
}

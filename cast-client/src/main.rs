//! cast client — entry point.
//!
//! ```text
//! cast-client --mode screen --host 192.168.1.10    View the stream
//! cast-client --mode input                         Forward input reports
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cast_client::viewer::{FrameAssembler, StatsConsumer};
use cast_core::{
    ClientSession, Connection, ConnectionInfo, FrameConsumer, FramePieceTracker, InputReport,
    SessionCommand, SessionEvent, SessionType, StreamSettings,
};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Authenticate as a screen-capture viewer and receive frames.
    Screen,
    /// Authenticate as an input session and forward idle reports.
    Input,
    /// Authenticate as a movie session (extension point).
    Movie,
}

#[derive(Parser, Debug)]
#[command(name = "cast-client", about = "cast client — stream viewer / input forwarder")]
struct Cli {
    /// Relay host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Relay port.
    #[arg(short, long, default_value_t = 1234)]
    port: u16,

    /// Session mode.
    #[arg(long, value_enum, default_value_t = Mode::Screen)]
    mode: Mode,

    /// Encoder quality to request, 0..=100.
    #[arg(long)]
    quality: Option<u32>,

    /// Capture scale to request, 0..=100.
    #[arg(long)]
    scale: Option<u32>,

    /// Pieces per frame, when known out-of-band. Without it, frames are
    /// claimed once a newer frame starts arriving.
    #[arg(long)]
    expected_pieces: Option<u8>,

    /// Milliseconds between idle input reports in input mode.
    #[arg(long, default_value_t = 1000)]
    idle_interval_ms: u64,

    /// Log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    let session_type = match cli.mode {
        Mode::Screen => SessionType::ScreenCapture,
        Mode::Input => SessionType::InputCapture,
        Mode::Movie => SessionType::Movie,
    };

    let info = ConnectionInfo::new(cli.host.clone(), cli.port);
    info!(%info, %session_type, "connecting");
    let connection = Connection::connect(&info).await?;

    let tracker = Arc::new(FramePieceTracker::new());
    let (session, mut handle) =
        ClientSession::new(session_type, connection, Arc::clone(&tracker));
    tokio::spawn(session.run());

    let commander = handle.commander();
    let stats = Arc::new(StatsConsumer::new(30));
    let mut assembler = FrameAssembler::new(
        tracker,
        Arc::clone(&stats) as Arc<dyn FrameConsumer>,
        cli.expected_pieces,
    );

    loop {
        tokio::select! {
            maybe = handle.next_event() => match maybe {
                Some(SessionEvent::Authenticated) => {
                    info!("authenticated");
                    match cli.mode {
                        Mode::Screen => {
                            if cli.quality.is_some() || cli.scale.is_some() {
                                let mut settings = StreamSettings::new();
                                if let Some(quality) = cli.quality {
                                    settings = settings.with_quality(quality);
                                }
                                if let Some(scale) = cli.scale {
                                    settings = settings.with_scale(scale);
                                }
                                commander
                                    .send(SessionCommand::ChangeSettings(settings))
                                    .await?;
                            }
                            commander.send(SessionCommand::StartStream).await?;
                        }
                        Mode::Input => {
                            commander.send(SessionCommand::StartInput).await?;
                            // periodic idle reports until the session dies
                            let idle_commander = commander.clone();
                            let period = Duration::from_millis(cli.idle_interval_ms.max(1));
                            tokio::spawn(async move {
                                let mut ticker = tokio::time::interval(period);
                                loop {
                                    ticker.tick().await;
                                    let report = InputReport::idle();
                                    let sent = idle_commander
                                        .send(SessionCommand::SendInput(report))
                                        .await;
                                    if sent.is_err() {
                                        break;
                                    }
                                }
                            });
                        }
                        Mode::Movie => info!("movie session ready"),
                    }
                }
                Some(SessionEvent::PieceStored { frame_index, .. }) => {
                    assembler.on_piece(frame_index).await;
                }
                Some(SessionEvent::Closed) | None => {
                    warn!("session closed");
                    break;
                }
            },
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("signal error: {e}");
                }
                info!("shutting down");
                let farewell = match cli.mode {
                    Mode::Screen => SessionCommand::StopStream,
                    Mode::Input => SessionCommand::StopInput,
                    Mode::Movie => SessionCommand::Close,
                };
                let _ = commander.send(farewell).await;
                // stop/stop-input are no-ops when nothing was started;
                // a Close behind them always ends the session
                let _ = commander.send(SessionCommand::Close).await;
            }
        }
    }

    info!(
        frames = stats.frame_count(),
        bytes = stats.byte_count(),
        "done"
    );
    Ok(())
}

//! # cast-relay
//!
//! The relay service: accepts source and viewer connections, gates them
//! behind the authentication handshake, splits encoded frames into
//! pieces for distribution, and routes input reports.

pub mod config;
pub mod pattern;
pub mod registry;
pub mod server;
pub mod session;

pub use config::RelayConfig;
pub use pattern::PatternProducer;
pub use registry::{
    FrameProducer, InputSink, LoggingInputSink, RegistryCommand, SessionRegistry, pump_frames,
    split_frame,
};
pub use server::RelayServer;
pub use session::RelaySession;

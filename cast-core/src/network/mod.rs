//! Managed TCP transport.

pub mod connection;

pub use connection::{Connection, ConnectionInfo, OutboundSender, TransportEvent};

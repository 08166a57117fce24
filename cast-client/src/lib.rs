//! # cast-client
//!
//! Client endpoints for the cast protocol: a viewer that reassembles
//! streamed frames, and an input forwarder.

pub mod viewer;

pub use viewer::{FrameAssembler, StatsConsumer};

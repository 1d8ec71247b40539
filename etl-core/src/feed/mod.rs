//! Live market-data feed: transport, subscription handshake, message
//! translation and the per-connection dispatch loop.

pub mod connection;
pub mod dispatcher;
pub mod messages;
pub mod subscription;
pub mod translate;
pub mod transport;

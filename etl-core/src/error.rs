//! Error taxonomy for the feed pipeline
//!
//! Fatal categories (`ConnectionFailed`, `Subscription`, `Malformed`,
//! `Protocol`) terminate the current connection with an explicit close
//! reason. Non-fatal ones (`RestError` during resync, unrecognized message
//! types) are logged with enough context to diagnose and leave the pipeline
//! running.

use thiserror::Error;

/// A recognized live message missing or carrying an unusable field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedMessage {
    #[error("missing field `{0}`")]
    FieldMissing(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("unparseable message: {0}")]
    Unparseable(String),
}

/// Handshake verification failure: the acknowledgement is not an exact
/// bijection with the required channel and product sets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionMismatch {
    #[error("acknowledged {actual} channels, configuration requires {expected}")]
    ChannelCount { expected: usize, actual: usize },

    #[error("acknowledged channel record is missing its name")]
    UnnamedChannel,

    #[error("subscribed to channel `{0}` which is not required by configuration")]
    UnexpectedChannel(String),

    #[error("required channels not acknowledged: {0:?}")]
    MissingChannels(Vec<String>),

    #[error("channel `{channel}` acknowledged {actual} products, configuration requires {expected}")]
    ProductCount {
        channel: String,
        expected: usize,
        actual: usize,
    },

    #[error("channel `{channel}` supports product `{product}` which is not required")]
    UnexpectedProduct { channel: String, product: String },

    #[error("channel `{channel}` does not support required products: {products:?}")]
    MissingProducts {
        channel: String,
        products: Vec<String>,
    },
}

/// Failures at the streaming transport boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid feed url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("close failed: {0}")]
    Close(String),
}

/// Failures of the historical-trades query. Always non-fatal to the live
/// stream: a failed backfill only affects historical completeness.
#[derive(Debug, Error)]
pub enum RestError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("malformed trade history payload: {0}")]
    Body(String),
}

/// A broker record was not acknowledged.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("broker send failed: {0}")]
    Send(String),
}

/// Top-level pipeline error.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("failed to connect to {url} after {attempts} attempts")]
    ConnectionFailed { url: String, attempts: u32 },

    #[error(transparent)]
    Subscription(#[from] SubscriptionMismatch),

    #[error(transparent)]
    Malformed(#[from] MalformedMessage),

    #[error("protocol error from feed: {0}")]
    Protocol(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

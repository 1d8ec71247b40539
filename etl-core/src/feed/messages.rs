//! Raw feed message shapes
//!
//! Incoming frames are deserialized into typed intermediate structs before
//! translation. Every field is optional at this layer; the translators turn
//! an absent field into an explicit `MalformedMessage::FieldMissing` instead
//! of a deserialization panic. Decimal fields accept either JSON numbers or
//! numeric strings, since the feed encodes prices as strings.

use serde::Deserialize;

/// Message type tags used by the feed.
pub mod msg_type {
    pub const SUBSCRIBE: &str = "subscribe";
    pub const SUBSCRIPTIONS: &str = "subscriptions";
    pub const TICKER: &str = "ticker";
    pub const MATCH: &str = "match";
    pub const LAST_MATCH: &str = "last_match";
    pub const ERROR: &str = "error";
}

/// A decimal the feed may encode as a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawDecimal {
    Number(f64),
    Text(String),
}

impl RawDecimal {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawDecimal::Number(n) => Some(*n),
            RawDecimal::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// An integer the feed may encode as a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawInt {
    Number(i64),
    Text(String),
}

impl RawInt {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RawInt::Number(n) => Some(*n),
            RawInt::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Raw `ticker` message.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTicker {
    pub time: Option<String>,
    pub sequence: Option<RawInt>,
    pub product_id: Option<String>,
    pub best_ask: Option<RawDecimal>,
    pub best_bid: Option<RawDecimal>,
    pub side: Option<String>,
    pub price: Option<RawDecimal>,
    pub last_size: Option<RawDecimal>,
}

/// Raw `match` message. The `last_match` marker carries the same payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMatch {
    pub time: Option<String>,
    pub trade_id: Option<RawInt>,
    pub product_id: Option<String>,
    pub side: Option<String>,
    pub price: Option<RawDecimal>,
    pub size: Option<RawDecimal>,
}

/// Raw `subscriptions` acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSubscriptions {
    #[serde(default)]
    pub channels: Vec<RawChannelAck>,
}

/// One acknowledged channel with the products it covers.
#[derive(Debug, Clone, Deserialize)]
pub struct RawChannelAck {
    pub name: Option<String>,
    #[serde(default)]
    pub product_ids: Vec<String>,
}

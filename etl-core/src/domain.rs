//! Domain events and value types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Taker side of a trade
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Parse a side string from the feed, case-insensitively.
    pub fn parse(s: &str) -> Option<Side> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Supported currency codes.
///
/// The set is closed on purpose: a product referencing a code outside this
/// enumeration is rejected during translation instead of flowing downstream
/// as an opaque string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    BTC,
    ETH,
    LTC,
    BCH,
    XRP,
    ADA,
    SOL,
    DOGE,
    DOT,
    LINK,
    USD,
    EUR,
    GBP,
    USDC,
    USDT,
    DAI,
}

impl Currency {
    pub fn parse(code: &str) -> Option<Currency> {
        match code {
            "BTC" => Some(Currency::BTC),
            "ETH" => Some(Currency::ETH),
            "LTC" => Some(Currency::LTC),
            "BCH" => Some(Currency::BCH),
            "XRP" => Some(Currency::XRP),
            "ADA" => Some(Currency::ADA),
            "SOL" => Some(Currency::SOL),
            "DOGE" => Some(Currency::DOGE),
            "DOT" => Some(Currency::DOT),
            "LINK" => Some(Currency::LINK),
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            "USDC" => Some(Currency::USDC),
            "USDT" => Some(Currency::USDT),
            "DAI" => Some(Currency::DAI),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Currency::BTC => "BTC",
            Currency::ETH => "ETH",
            Currency::LTC => "LTC",
            Currency::BCH => "BCH",
            Currency::XRP => "XRP",
            Currency::ADA => "ADA",
            Currency::SOL => "SOL",
            Currency::DOGE => "DOGE",
            Currency::DOT => "DOT",
            Currency::LINK => "LINK",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::USDC => "USDC",
            Currency::USDT => "USDT",
            Currency::DAI => "DAI",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Best bid/ask snapshot with the last trade, produced by the ticker channel.
///
/// `sequence` increases monotonically per product and doubles as the record
/// key at the producer boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub timestamp_ms: i64,
    pub sequence: i64,
    pub base: Currency,
    pub quote: Currency,
    pub best_ask: f64,
    pub best_bid: f64,
    pub last_trade_side: Side,
    pub last_trade_price: f64,
    pub last_trade_size: f64,
}

/// A completed trade.
///
/// `trade_id` is unique per product and strictly increasing in feed emission
/// order. The pipeline never intentionally re-emits the same trade id within
/// a logical session; downstream consumers treat duplicates as idempotent
/// upserts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub timestamp_ms: i64,
    pub trade_id: i64,
    pub base: Currency,
    pub quote: Currency,
    pub side: Side,
    pub price: f64,
    pub size: f64,
}

/// Products and channels the feed session must subscribe to.
///
/// Supplied once at startup; used both to build the subscribe request and to
/// verify the acknowledgement against it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionRequirement {
    pub products: BTreeSet<String>,
    pub channels: BTreeSet<String>,
}

impl SubscriptionRequirement {
    pub fn new<P, C>(products: P, channels: C) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            products: products.into_iter().map(Into::into).collect(),
            channels: channels.into_iter().map(Into::into).collect(),
        }
    }
}

/// Lifecycle state of the feed connection, owned by the connection manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Failed,
}

impl ConnectionState {
    /// Only an established session reports healthy.
    pub fn is_healthy(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Open => "OPEN",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

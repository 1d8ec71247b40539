//! Coinbase market-data ETL
//!
//! Consumes the exchange's websocket feed, verifies the subscription
//! handshake, translates ticker and match messages into typed domain events,
//! backfills gaps from the historical trades endpoint, and fans events out
//! over an internal bus to optional broker producers.

pub mod bus;
pub mod config;
pub mod domain;
pub mod error;
pub mod feed;
pub mod producer;
pub mod rest;
pub mod resync;

pub use bus::EventBus;
pub use config::{BrokerConfig, EtlConfig, FeedConfig, RestConfig, RetryConfig};
pub use domain::{ConnectionState, Currency, Match, Side, SubscriptionRequirement, Ticker};
pub use error::EtlError;
pub use feed::connection::{ConnectionHealth, FeedConnection};
pub use feed::dispatcher::Dispatcher;
pub use feed::transport::{CloseReason, FeedTransport, WsTransport};
pub use producer::{BrokerSink, EventProducer, ProducerHealth, TracingSink};
pub use rest::CoinbaseRestClient;
pub use resync::{ResyncEngine, TradeHistory};

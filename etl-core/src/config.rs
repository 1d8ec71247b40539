//! Pipeline configuration
//!
//! Defaults carry the constants the pipeline was tuned with: the public
//! Coinbase endpoints, the `ticker` and `matches` channels, a fixed retry
//! throttle of 4500 ms and at most 3 connection attempts. The retry policy
//! is deliberately fixed rather than adaptive.

use crate::domain::SubscriptionRequirement;
use std::time::Duration;

/// Streaming feed endpoint and subscription surface.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: String,
    /// Product symbol, e.g. `BTC-USD`.
    pub product: String,
    pub channels: Vec<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "wss://ws-feed.exchange.coinbase.com".to_string(),
            product: "BTC-USD".to_string(),
            channels: vec!["ticker".to_string(), "matches".to_string()],
        }
    }
}

/// Historical-trades REST endpoint.
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.exchange.coinbase.com".to_string(),
        }
    }
}

/// Broker producer boundary. Disabled by default so the pipeline can run
/// without a durable log attached.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub enabled: bool,
    pub match_topic: String,
    pub ticker_topic: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            match_topic: "coinbase.matches".to_string(),
            ticker_topic: "coinbase.tickers".to_string(),
        }
    }
}

/// Bounded-retry policy for establishing the feed connection.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub throttle: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            throttle: Duration::from_millis(4500),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EtlConfig {
    pub feed: FeedConfig,
    pub rest: RestConfig,
    pub broker: BrokerConfig,
    pub retry: RetryConfig,
}

impl EtlConfig {
    /// The subscription the handshake must establish, verbatim.
    pub fn subscription(&self) -> SubscriptionRequirement {
        SubscriptionRequirement::new([self.feed.product.clone()], self.feed.channels.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_subscription_covers_configured_product_and_channels() {
        let config = EtlConfig::default();
        let req = config.subscription();
        assert!(req.products.contains("BTC-USD"));
        assert!(req.channels.contains("ticker"));
        assert!(req.channels.contains("matches"));
        assert_eq!(req.channels.len(), 2);
    }

    #[test]
    fn retry_defaults_are_fixed() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.throttle, Duration::from_millis(4500));
    }
}

//! Gap resync after a fresh connection
//!
//! The last-match marker names the most recent trade id known at connection
//! time. The resync engine fetches the latest trades from the historical
//! endpoint and replays the ones the stream missed as ordered Match events.
//! A failed resync is a silent gap flagged via logs, never a pipeline error:
//! a broken live connection cannot make progress, a failed backfill only
//! affects historical completeness.

use crate::bus::EventBus;
use crate::domain::{Currency, Match};
use crate::error::{MalformedMessage, RestError};
use crate::feed::messages::{RawDecimal, RawInt};
use crate::feed::translate;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

/// Exchange-documented maximum page size for the trades endpoint.
pub const TRADE_PAGE_SIZE: u32 = 100;

/// One trade record from the historical endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RestTrade {
    pub time: Option<String>,
    pub trade_id: Option<RawInt>,
    pub price: Option<RawDecimal>,
    pub size: Option<RawDecimal>,
    pub side: Option<String>,
}

/// Query capability over the exchange's historical trades.
#[async_trait]
pub trait TradeHistory: Send + Sync {
    /// Latest trades for a product, newest first as delivered by the
    /// exchange.
    async fn latest_trades(&self, product: &str, limit: u32) -> Result<Vec<RestTrade>, RestError>;
}

/// Replays trades missed between the stream's last known state and its live
/// position.
pub struct ResyncEngine<H> {
    history: H,
    product: String,
    base: Currency,
    quote: Currency,
    bus: EventBus,
}

impl<H: TradeHistory> ResyncEngine<H> {
    pub fn new(history: H, product: &str, bus: EventBus) -> Result<Self, MalformedMessage> {
        let (base, quote) = translate::split_product(Some(product), "product_id")?;
        Ok(Self {
            history,
            product: product.to_string(),
            base,
            quote,
            bus,
        })
    }

    /// Fetch the latest trades and publish every trade strictly before the
    /// marker, in the order the endpoint returned them. No re-sorting is
    /// performed; the endpoint's ordering is taken as delivered.
    pub async fn replay(&self, last_trade_id: i64) -> Result<usize, RestError> {
        info!(
            product = %self.product,
            last_trade_id,
            "fetching latest trades to resync"
        );
        let trades = self
            .history
            .latest_trades(&self.product, TRADE_PAGE_SIZE)
            .await?;

        // Translate everything before publishing anything: a malformed
        // record fails the whole attempt instead of a partial replay.
        let mut matches = Vec::with_capacity(trades.len());
        for trade in &trades {
            matches.push(
                self.to_match(trade)
                    .map_err(|e| RestError::Body(e.to_string()))?,
            );
        }

        let mut published = 0;
        for event in matches {
            // The marker's own trade arrives on the live stream; replaying
            // it here would re-emit the same trade id.
            if event.trade_id >= last_trade_id {
                continue;
            }
            debug!(trade_id = event.trade_id, "match fetched and published");
            self.bus.publish_match(event);
            published += 1;
        }
        info!(published, "resync complete");
        Ok(published)
    }

    fn to_match(&self, trade: &RestTrade) -> Result<Match, MalformedMessage> {
        Ok(Match {
            timestamp_ms: translate::timestamp_ms(trade.time.as_deref(), "time")?,
            trade_id: translate::integer(trade.trade_id.as_ref(), "trade_id")?,
            base: self.base,
            quote: self.quote,
            side: translate::side(trade.side.as_deref(), "side")?,
            price: translate::decimal(trade.price.as_ref(), "price")?,
            size: translate::decimal(trade.size.as_ref(), "size")?,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::Side;
    use serde_json::json;

    pub(crate) struct FixedHistory {
        trades: Result<Vec<RestTrade>, u16>,
    }

    impl FixedHistory {
        pub(crate) fn with_trades(raw: serde_json::Value) -> Self {
            Self {
                trades: Ok(serde_json::from_value(raw).unwrap()),
            }
        }

        pub(crate) fn failing(status: u16) -> Self {
            Self {
                trades: Err(status),
            }
        }
    }

    #[async_trait]
    impl TradeHistory for FixedHistory {
        async fn latest_trades(
            &self,
            _product: &str,
            _limit: u32,
        ) -> Result<Vec<RestTrade>, RestError> {
            match &self.trades {
                Ok(trades) => Ok(trades.clone()),
                Err(status) => Err(RestError::Status {
                    url: "https://example/products/btc-usd/trades".to_string(),
                    status: *status,
                }),
            }
        }
    }

    fn trade(id: i64, side: &str) -> serde_json::Value {
        json!({
            "time": "2021-02-19T15:30:00.000000Z",
            "trade_id": id,
            "price": "50000.00",
            "size": "0.001",
            "side": side
        })
    }

    #[tokio::test]
    async fn replays_all_trades_in_endpoint_order() {
        let history = FixedHistory::with_trades(json!([trade(3, "buy"), trade(1, "sell"), trade(2, "buy")]));
        let bus = EventBus::default();
        let mut rx = bus.subscribe_matches();
        let engine = ResyncEngine::new(history, "BTC-USD", bus.clone()).unwrap();

        let published = engine.replay(100).await.unwrap();
        assert_eq!(published, 3);

        // Endpoint order, no re-sorting.
        assert_eq!(rx.try_recv().unwrap().trade_id, 3);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.trade_id, 1);
        assert_eq!(second.side, Side::Sell);
        assert_eq!(second.base, Currency::BTC);
        assert_eq!(second.quote, Currency::USD);
        assert_eq!(rx.try_recv().unwrap().trade_id, 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn trades_at_or_after_marker_are_skipped() {
        let history =
            FixedHistory::with_trades(json!([trade(42, "buy"), trade(41, "buy"), trade(40, "sell")]));
        let bus = EventBus::default();
        let mut rx = bus.subscribe_matches();
        let engine = ResyncEngine::new(history, "BTC-USD", bus.clone()).unwrap();

        let published = engine.replay(42).await.unwrap();
        assert_eq!(published, 2);
        assert_eq!(rx.try_recv().unwrap().trade_id, 41);
        assert_eq!(rx.try_recv().unwrap().trade_id, 40);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn http_failure_publishes_nothing() {
        let history = FixedHistory::failing(500);
        let bus = EventBus::default();
        let mut rx = bus.subscribe_matches();
        let engine = ResyncEngine::new(history, "BTC-USD", bus.clone()).unwrap();

        let err = engine.replay(100).await.unwrap_err();
        assert!(matches!(err, RestError::Status { status: 500, .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_record_fails_whole_attempt() {
        let history = FixedHistory::with_trades(json!([
            trade(2, "buy"),
            {"time": "2021-02-19T15:30:00.000000Z", "trade_id": 1, "price": "x", "size": "0.1", "side": "buy"}
        ]));
        let bus = EventBus::default();
        let mut rx = bus.subscribe_matches();
        let engine = ResyncEngine::new(history, "BTC-USD", bus.clone()).unwrap();

        let err = engine.replay(100).await.unwrap_err();
        assert!(matches!(err, RestError::Body(_)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn rejects_unknown_product() {
        let history = FixedHistory::failing(500);
        assert!(ResyncEngine::new(history, "WEN-MOON", EventBus::default()).is_err());
    }
}

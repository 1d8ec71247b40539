//! Internal event bus
//!
//! Two typed broadcast channels, one per event kind, replacing a generic
//! pub/sub with runtime-registered codecs. Delivery is at-most-once per
//! publish call; ordering is preserved per publisher. Publishing with no
//! subscribers is not an error.

use crate::domain::{Match, Ticker};
use tokio::sync::broadcast;
use tracing::trace;

pub const DEFAULT_BUS_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct EventBus {
    tickers: broadcast::Sender<Ticker>,
    matches: broadcast::Sender<Match>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tickers, _) = broadcast::channel(capacity);
        let (matches, _) = broadcast::channel(capacity);
        Self { tickers, matches }
    }

    pub fn publish_ticker(&self, ticker: Ticker) {
        trace!(sequence = ticker.sequence, "publishing ticker event");
        let _ = self.tickers.send(ticker);
    }

    pub fn publish_match(&self, event: Match) {
        trace!(trade_id = event.trade_id, "publishing match event");
        let _ = self.matches.send(event);
    }

    pub fn subscribe_tickers(&self) -> broadcast::Receiver<Ticker> {
        self.tickers.subscribe()
    }

    pub fn subscribe_matches(&self) -> broadcast::Receiver<Match> {
        self.matches.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Currency, Side};

    fn sample_match(trade_id: i64) -> Match {
        Match {
            timestamp_ms: 1_613_748_662_000,
            trade_id,
            base: Currency::BTC,
            quote: Currency::USD,
            side: Side::Buy,
            price: 50000.0,
            size: 0.01,
        }
    }

    #[tokio::test]
    async fn delivers_matches_in_publish_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_matches();

        bus.publish_match(sample_match(1));
        bus.publish_match(sample_match(2));

        assert_eq!(rx.recv().await.unwrap().trade_id, 1);
        assert_eq!(rx.recv().await.unwrap().trade_id, 2);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish_match(sample_match(1));
        // A late subscriber does not see earlier events.
        let mut rx = bus.subscribe_matches();
        bus.publish_match(sample_match(2));
        assert_eq!(rx.recv().await.unwrap().trade_id, 2);
    }
}

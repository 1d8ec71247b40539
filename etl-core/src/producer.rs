//! Outbound producer boundary
//!
//! Events cross from the typed bus to an external broker through a
//! `BrokerSink`. Producer health is sticky: the first failed delivery marks
//! the producer unhealthy and it stays that way until the process restarts,
//! since a broker that dropped one record may have dropped others silently.

use crate::domain::{Match, Ticker};
use crate::error::SinkError;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, trace, warn};

/// Delivery capability to an external broker topic.
#[async_trait]
pub trait BrokerSink: Send + Sync {
    async fn deliver(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), SinkError>;
}

/// Sink that logs deliveries instead of shipping them. Used when no broker
/// is configured, keeping the rest of the pipeline identical either way.
#[derive(Default)]
pub struct TracingSink;

#[async_trait]
impl BrokerSink for TracingSink {
    async fn deliver(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), SinkError> {
        info!(topic, key, bytes = payload.len(), "record delivered");
        Ok(())
    }
}

/// Cloneable read handle over a producer's sticky health flag.
#[derive(Clone, Default)]
pub struct ProducerHealth {
    failed: Arc<AtomicBool>,
}

impl ProducerHealth {
    pub fn is_healthy(&self) -> bool {
        !self.failed.load(Ordering::SeqCst)
    }

    fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }
}

/// Drains one bus stream into one broker topic.
pub struct EventProducer<S> {
    sink: S,
    topic: String,
    health: ProducerHealth,
}

impl<S: BrokerSink> EventProducer<S> {
    pub fn new(sink: S, topic: impl Into<String>) -> Self {
        Self {
            sink,
            topic: topic.into(),
            health: ProducerHealth::default(),
        }
    }

    pub fn health(&self) -> ProducerHealth {
        self.health.clone()
    }

    /// Forward match events until the bus closes. Lagged receivers skip
    /// ahead with a warning rather than stalling the feed.
    pub async fn run_matches(&self, mut rx: broadcast::Receiver<Match>) {
        info!(topic = %self.topic, "match producer started");
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let key = event.trade_id.to_string();
                    self.send(&key, &event).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "match producer lagged behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!(topic = %self.topic, "match producer stopped");
    }

    /// Forward ticker events until the bus closes.
    pub async fn run_tickers(&self, mut rx: broadcast::Receiver<Ticker>) {
        info!(topic = %self.topic, "ticker producer started");
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let key = event.sequence.to_string();
                    self.send(&key, &event).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "ticker producer lagged behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!(topic = %self.topic, "ticker producer stopped");
    }

    async fn send<E: Serialize>(&self, key: &str, event: &E) {
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(topic = %self.topic, key, error = %e, "failed to serialize record");
                self.health.mark_failed();
                return;
            }
        };
        match self.sink.deliver(&self.topic, key, payload).await {
            Ok(()) => trace!(topic = %self.topic, key, "record sent"),
            Err(e) => {
                error!(topic = %self.topic, key, error = %e, "failed to deliver record");
                self.health.mark_failed();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::domain::{Currency, Side};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingSink {
        records: Arc<Mutex<Vec<(String, String, Vec<u8>)>>>,
        fail: Arc<AtomicBool>,
    }

    #[async_trait]
    impl BrokerSink for RecordingSink {
        async fn deliver(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), SinkError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SinkError::Send("broker unavailable".to_string()));
            }
            self.records
                .lock()
                .unwrap()
                .push((topic.to_string(), key.to_string(), payload));
            Ok(())
        }
    }

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
    async fn forwards_matches_keyed_by_trade_id() {
        let sink = RecordingSink::default();
        let producer = EventProducer::new(sink.clone(), "coinbase.matches");
        let bus = EventBus::default();
        let rx = bus.subscribe_matches();

        bus.publish_match(sample_match(7));
        bus.publish_match(sample_match(8));
        // Dropping the bus closes the channel once the backlog drains.
        drop(bus);
        producer.run_matches(rx).await;

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, "coinbase.matches");
        assert_eq!(records[0].1, "7");
        assert_eq!(records[1].1, "8");
        let decoded: Match = serde_json::from_slice(&records[0].2).unwrap();
        assert_eq!(decoded.trade_id, 7);
    }

    #[tokio::test]
    async fn delivery_failure_is_sticky() {
        let sink = RecordingSink::default();
        sink.fail.store(true, Ordering::SeqCst);
        let producer = EventProducer::new(sink.clone(), "coinbase.matches");
        let health = producer.health();
        assert!(health.is_healthy());

        producer.send("7", &sample_match(7)).await;
        assert!(!health.is_healthy());

        // A later successful delivery does not restore health.
        sink.fail.store(false, Ordering::SeqCst);
        producer.send("8", &sample_match(8)).await;
        assert!(!health.is_healthy());
        assert_eq!(sink.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tracing_sink_always_succeeds() {
        let producer = EventProducer::new(TracingSink, "coinbase.tickers");
        producer.send("1", &sample_match(1)).await;
        assert!(producer.health().is_healthy());
    }
}

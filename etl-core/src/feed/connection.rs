//! Feed connection lifecycle
//!
//! Owns the connection state machine: DISCONNECTED -> CONNECTING -> OPEN ->
//! CLOSING/FAILED -> DISCONNECTED. Connecting retries with a fixed throttle
//! up to a configured maximum; an established session that drops is not
//! reconnected automatically (recovery is a process-level restart concern).

use crate::config::RetryConfig;
use crate::domain::ConnectionState;
use crate::error::EtlError;
use crate::feed::dispatcher::Dispatcher;
use crate::feed::transport::{CloseReason, FeedSession, FeedTransport};
use crate::resync::TradeHistory;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{error, info};

/// Cloneable read handle over the connection state. Only `Open` reports
/// healthy; an external health layer aggregates this with producer health.
#[derive(Clone)]
pub struct ConnectionHealth {
    state: Arc<RwLock<ConnectionState>>,
}

impl ConnectionHealth {
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_healthy(&self) -> bool {
        self.state().await.is_healthy()
    }

    pub(crate) async fn set(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self {
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
        }
    }
}

/// Owns the physical session handle exclusively and drives its lifecycle.
pub struct FeedConnection<T> {
    transport: T,
    url: String,
    retry: RetryConfig,
    retry_count: u32,
    health: ConnectionHealth,
}

impl<T: FeedTransport> FeedConnection<T> {
    pub fn new(transport: T, url: impl Into<String>, retry: RetryConfig) -> Self {
        Self {
            transport,
            url: url.into(),
            retry,
            retry_count: 0,
            health: ConnectionHealth::default(),
        }
    }

    pub fn health(&self) -> ConnectionHealth {
        self.health.clone()
    }

    /// Establish the session with bounded retry and a fixed throttle between
    /// attempts. A successful attempt resets the retry counter to zero.
    pub async fn connect(&mut self) -> Result<FeedSession, EtlError> {
        self.health.set(ConnectionState::Connecting).await;
        loop {
            match self.transport.connect().await {
                Ok(session) => {
                    self.retry_count = 0;
                    self.health.set(ConnectionState::Open).await;
                    info!(url = %self.url, "feed session established");
                    return Ok(session);
                }
                Err(e) => {
                    self.retry_count += 1;
                    error!(
                        url = %self.url,
                        attempt = self.retry_count,
                        error = %e,
                        "failed to connect to feed"
                    );
                    if self.retry_count >= self.retry.max_retries {
                        self.health.set(ConnectionState::Failed).await;
                        return Err(EtlError::ConnectionFailed {
                            url: self.url.clone(),
                            attempts: self.retry_count,
                        });
                    }
                    tokio::time::sleep(self.retry.throttle).await;
                }
            }
        }
    }

    /// Connect and run the dispatch loop until the session closes. The
    /// health signal flips to unhealthy on any close, local or remote.
    pub async fn run<H: TradeHistory>(
        &mut self,
        dispatcher: &mut Dispatcher<H>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<CloseReason, EtlError> {
        let session = self.connect().await?;
        let reason = dispatcher.run(session, self.health.clone(), shutdown).await;
        self.health.set(ConnectionState::Disconnected).await;
        if reason.is_normal() {
            info!(%reason, "feed session closed");
        } else {
            error!(%reason, "feed session closed");
        }
        Ok(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::feed::transport::{FeedSink, TransportEvent};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct NullSink;

    #[async_trait]
    impl FeedSink for NullSink {
        async fn send_text(&mut self, _text: String) -> Result<(), TransportError> {
            Ok(())
        }
        async fn close(&mut self, _reason: CloseReason) -> Result<(), TransportError> {
            Ok(())
        }
    }

    /// Fails the first `failures` attempts, then succeeds.
    struct FlakyTransport {
        failures: u32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl FeedTransport for FlakyTransport {
        async fn connect(&self) -> Result<FeedSession, TransportError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                return Err(TransportError::Connect("connection refused".to_string()));
            }
            let (_tx, rx) = mpsc::channel::<TransportEvent>(8);
            Ok(FeedSession {
                sink: Box::new(NullSink),
                events: rx,
            })
        }
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            throttle: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn fails_after_max_retries() {
        let transport = FlakyTransport {
            failures: u32::MAX,
            attempts: AtomicU32::new(0),
        };
        let mut connection = FeedConnection::new(transport, "wss://example", fast_retry(3));

        let err = connection.connect().await.unwrap_err();
        match err {
            EtlError::ConnectionFailed { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected ConnectionFailed, got {:?}", other),
        }
        assert_eq!(connection.transport.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(connection.health.state().await, ConnectionState::Failed);
        assert!(!connection.health.is_healthy().await);
    }

    #[tokio::test]
    async fn success_before_limit_resets_counter() {
        let transport = FlakyTransport {
            failures: 2,
            attempts: AtomicU32::new(0),
        };
        let mut connection = FeedConnection::new(transport, "wss://example", fast_retry(3));

        connection.connect().await.unwrap();
        assert_eq!(connection.retry_count, 0);
        assert_eq!(connection.health.state().await, ConnectionState::Open);
        assert!(connection.health.is_healthy().await);
    }

    #[tokio::test]
    async fn immediate_success_connects_once() {
        let transport = FlakyTransport {
            failures: 0,
            attempts: AtomicU32::new(0),
        };
        let mut connection = FeedConnection::new(transport, "wss://example", fast_retry(3));

        connection.connect().await.unwrap();
        assert_eq!(connection.transport.attempts.load(Ordering::SeqCst), 1);
    }
}

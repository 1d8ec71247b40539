//! Transport abstraction for the streaming feed
//!
//! The connection state machine is driven by `TransportEvent`s pushed from a
//! transport implementation, decoupling it from any particular stack. The
//! production transport is tokio-tungstenite; tests drive the same events
//! from plain channels.

use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info};
use url::Url;

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseCode {
    Normal,
    ProtocolError,
    Abnormal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReason {
    pub code: CloseCode,
    pub reason: String,
}

impl CloseReason {
    pub fn normal(reason: impl Into<String>) -> Self {
        Self {
            code: CloseCode::Normal,
            reason: reason.into(),
        }
    }

    pub fn protocol_error(reason: impl Into<String>) -> Self {
        Self {
            code: CloseCode::ProtocolError,
            reason: reason.into(),
        }
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: CloseCode::Abnormal,
            reason: reason.into(),
        }
    }

    pub fn is_normal(&self) -> bool {
        self.code == CloseCode::Normal
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.reason)
    }
}

/// Inbound events from the transport, delivered in arrival order.
#[derive(Debug)]
pub enum TransportEvent {
    /// The session handshake completed; the feed is ready for the subscribe
    /// request.
    Opened,
    /// A text frame.
    Message(String),
    /// The transport failed mid-session.
    Failed(String),
    /// The session closed, locally or remotely.
    Closed(CloseReason),
}

/// Outbound half of an established session.
#[async_trait]
pub trait FeedSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
    async fn close(&mut self, reason: CloseReason) -> Result<(), TransportError>;
}

/// An established session: a sink for outbound frames plus the inbound event
/// stream.
pub struct FeedSession {
    pub sink: Box<dyn FeedSink>,
    pub events: mpsc::Receiver<TransportEvent>,
}

impl std::fmt::Debug for FeedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSession").finish_non_exhaustive()
    }
}

/// Capability to open a feed session.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn connect(&self) -> Result<FeedSession, TransportError>;
}

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// WebSocket transport over tokio-tungstenite.
pub struct WsTransport {
    url: Url,
}

impl WsTransport {
    pub fn new(url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(url).map_err(|e| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { url })
    }
}

#[async_trait]
impl FeedTransport for WsTransport {
    async fn connect(&self) -> Result<FeedSession, TransportError> {
        let (stream, _) = connect_async(self.url.clone())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!(url = %self.url, "connected to feed");

        let (sink, mut reader) = stream.split();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        // The handshake already completed; surface it as the first event so
        // the dispatcher sends the subscribe request.
        let _ = tx.send(TransportEvent::Opened).await;

        tokio::spawn(async move {
            let mut closed = false;
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if tx.send(TransportEvent::Message(text)).await.is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        let reason = match frame {
                            Some(f) if f.code == WsCloseCode::Normal => {
                                CloseReason::normal(f.reason.to_string())
                            }
                            Some(f) => CloseReason::abnormal(format!("{}: {}", f.code, f.reason)),
                            None => CloseReason::abnormal("closed without a reason"),
                        };
                        let _ = tx.send(TransportEvent::Closed(reason)).await;
                        closed = true;
                        break;
                    }
                    Ok(Message::Ping(payload)) => {
                        // tungstenite queues the pong; it is flushed on the
                        // next write.
                        debug!(bytes = payload.len(), "ping received");
                    }
                    Ok(other) => {
                        debug!(?other, "non-text frame ignored");
                    }
                    Err(e) => {
                        error!(error = %e, "websocket read failed");
                        let _ = tx.send(TransportEvent::Failed(e.to_string())).await;
                        closed = true;
                        break;
                    }
                }
            }
            if !closed {
                let _ = tx
                    .send(TransportEvent::Closed(CloseReason::abnormal(
                        "connection reset by peer",
                    )))
                    .await;
            }
        });

        Ok(FeedSession {
            sink: Box::new(WsSink { inner: sink }),
            events: rx,
        })
    }
}

type WsWriteHalf = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<TcpStream>>,
    Message,
>;

struct WsSink {
    inner: WsWriteHalf,
}

#[async_trait]
impl FeedSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self, reason: CloseReason) -> Result<(), TransportError> {
        let code = match reason.code {
            CloseCode::Normal => WsCloseCode::Normal,
            // Abnormal closure (1006) is reserved and may not go on the
            // wire; report both local failure modes as protocol closes.
            CloseCode::ProtocolError | CloseCode::Abnormal => WsCloseCode::Protocol,
        };
        self.inner
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: reason.reason.into(),
            })))
            .await
            .map_err(|e| TransportError::Close(e.to_string()))?;
        let _ = self.inner.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_url() {
        assert!(matches!(
            WsTransport::new("not a url"),
            Err(TransportError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn close_reason_classification() {
        assert!(CloseReason::normal("done").is_normal());
        assert!(!CloseReason::protocol_error("bad ack").is_normal());
        assert!(!CloseReason::abnormal("reset").is_normal());
    }
}

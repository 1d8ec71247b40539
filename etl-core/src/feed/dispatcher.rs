//! Per-connection dispatch loop
//!
//! A single loop consumes transport events in order: the subscribe request
//! goes out on open, the acknowledgement is verified before the connection
//! is trusted, and every live message is classified by its type tag and
//! routed to the matching translator. Translation failures on a recognized
//! type are protocol-fatal; unrecognized types are logged and ignored.

use crate::bus::EventBus;
use crate::domain::{ConnectionState, SubscriptionRequirement};
use crate::error::{EtlError, MalformedMessage};
use crate::feed::connection::ConnectionHealth;
use crate::feed::messages::{msg_type, RawSubscriptions};
use crate::feed::subscription::{build_subscribe_message, verify_subscription_ack};
use crate::feed::translate;
use crate::feed::transport::{CloseReason, FeedSession, TransportEvent};
use crate::resync::{ResyncEngine, TradeHistory};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub struct Dispatcher<H> {
    requirement: SubscriptionRequirement,
    bus: EventBus,
    resync: ResyncEngine<H>,
    resynced: bool,
}

impl<H: TradeHistory> Dispatcher<H> {
    pub fn new(
        requirement: SubscriptionRequirement,
        bus: EventBus,
        resync: ResyncEngine<H>,
    ) -> Self {
        Self {
            requirement,
            bus,
            resync,
            resynced: false,
        }
    }

    /// Drive one session to completion and report why it closed.
    pub async fn run(
        &mut self,
        mut session: FeedSession,
        health: ConnectionHealth,
        mut shutdown: watch::Receiver<bool>,
    ) -> CloseReason {
        // Resync fires at most once per connection.
        self.resynced = false;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("shutdown requested, closing feed session");
                    return self
                        .close_session(&mut session, &health, CloseReason::normal("closed by shutdown"))
                        .await;
                }
                event = session.events.recv() => {
                    match event {
                        None => return CloseReason::abnormal("transport event channel dropped"),
                        Some(TransportEvent::Opened) => {
                            let subscribe = build_subscribe_message(&self.requirement);
                            if let Err(e) = session.sink.send_text(subscribe.to_string()).await {
                                error!(error = %e, "failed to subscribe to feed channels");
                                return self
                                    .close_session(
                                        &mut session,
                                        &health,
                                        CloseReason::protocol_error(
                                            "an error occurred while subscribing to channels",
                                        ),
                                    )
                                    .await;
                            }
                            info!("subscribe request sent");
                        }
                        Some(TransportEvent::Message(text)) => {
                            if let Err(e) = self.handle_message(&text).await {
                                error!(error = %e, payload = %text, "failed to process feed message");
                                return self
                                    .close_session(
                                        &mut session,
                                        &health,
                                        CloseReason::protocol_error(
                                            "an error occurred while processing a message from the feed",
                                        ),
                                    )
                                    .await;
                            }
                        }
                        Some(TransportEvent::Failed(e)) => {
                            error!(error = %e, "websocket error received from feed");
                            return self
                                .close_session(
                                    &mut session,
                                    &health,
                                    CloseReason::protocol_error("websocket error received from feed"),
                                )
                                .await;
                        }
                        Some(TransportEvent::Closed(reason)) => return reason,
                    }
                }
            }
        }
    }

    async fn handle_message(&mut self, text: &str) -> Result<(), EtlError> {
        let raw: Value = serde_json::from_str(text)
            .map_err(|e| MalformedMessage::Unparseable(e.to_string()))?;
        let kind = raw
            .get("type")
            .and_then(Value::as_str)
            .ok_or(MalformedMessage::FieldMissing("type"))?;
        debug!(msg_type = kind, "message received from feed");

        match kind {
            msg_type::SUBSCRIPTIONS => {
                let ack: RawSubscriptions = serde_json::from_value(raw.clone())
                    .map_err(|e| MalformedMessage::Unparseable(e.to_string()))?;
                verify_subscription_ack(&ack, &self.requirement)?;
                info!("subscription verified");
            }
            msg_type::TICKER => {
                let ticker = translate::ticker(&raw)?;
                self.bus.publish_ticker(ticker);
            }
            msg_type::MATCH => {
                let event = translate::match_event(&raw)?;
                self.bus.publish_match(event);
            }
            msg_type::LAST_MATCH => {
                let marker = translate::last_match_trade_id(&raw)?;
                let derived = translate::last_match(&raw)?;
                if self.resynced {
                    warn!(last_trade_id = marker, "duplicate last_match marker ignored");
                } else {
                    self.resynced = true;
                    // Synchronous by design: the marker handler waits for the
                    // backfill, bounding in-flight resyncs to one. A failed
                    // resync leaves a gap but never kills the live stream.
                    if let Err(e) = self.resync.replay(marker).await {
                        error!(
                            error = %e,
                            last_trade_id = marker,
                            "trade resync failed, continuing with a gap"
                        );
                    }
                }
                self.bus.publish_match(derived);
            }
            msg_type::ERROR => {
                let message = raw
                    .get("message")
                    .and_then(Value::as_str)
                    .ok_or(MalformedMessage::FieldMissing("message"))?;
                return Err(EtlError::Protocol(message.to_string()));
            }
            other => {
                warn!(msg_type = other, payload = %raw, "unsupported message type ignored");
            }
        }
        Ok(())
    }

    async fn close_session(
        &self,
        session: &mut FeedSession,
        health: &ConnectionHealth,
        reason: CloseReason,
    ) -> CloseReason {
        health.set(ConnectionState::Closing).await;
        if let Err(e) = session.sink.close(reason.clone()).await {
            error!(error = %e, "websocket could not be closed normally");
            return CloseReason::abnormal("websocket could not be closed normally");
        }
        reason
    }
}

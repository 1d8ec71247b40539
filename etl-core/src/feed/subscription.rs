//! Subscription handshake: request construction and strict acknowledgement
//! verification.

use crate::domain::SubscriptionRequirement;
use crate::error::SubscriptionMismatch;
use crate::feed::messages::{msg_type, RawSubscriptions};
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Build the subscribe request for the required products and channels.
///
/// Pure; array ordering is implementation-defined and not relied on
/// downstream.
pub fn build_subscribe_message(req: &SubscriptionRequirement) -> Value {
    json!({
        "type": msg_type::SUBSCRIBE,
        "product_ids": req.products.iter().collect::<Vec<_>>(),
        "channels": req.channels.iter().collect::<Vec<_>>(),
    })
}

/// Verify the subscription acknowledgement against the requirement.
///
/// This is a strict bijection check, not a subset check: the acknowledged
/// channel set must match the required one exactly, and every acknowledged
/// channel must cover exactly the required product set. Over- and
/// under-subscription are both protocol violations.
pub fn verify_subscription_ack(
    ack: &RawSubscriptions,
    req: &SubscriptionRequirement,
) -> Result<(), SubscriptionMismatch> {
    if ack.channels.len() != req.channels.len() {
        return Err(SubscriptionMismatch::ChannelCount {
            expected: req.channels.len(),
            actual: ack.channels.len(),
        });
    }

    let mut pending_channels: BTreeSet<&str> = req.channels.iter().map(String::as_str).collect();

    for record in &ack.channels {
        let name = record
            .name
            .as_deref()
            .ok_or(SubscriptionMismatch::UnnamedChannel)?;

        // A second occurrence of the same channel fails here too.
        if !pending_channels.remove(name) {
            return Err(SubscriptionMismatch::UnexpectedChannel(name.to_string()));
        }

        if record.product_ids.len() != req.products.len() {
            return Err(SubscriptionMismatch::ProductCount {
                channel: name.to_string(),
                expected: req.products.len(),
                actual: record.product_ids.len(),
            });
        }

        let mut pending_products: BTreeSet<&str> =
            req.products.iter().map(String::as_str).collect();
        for product in &record.product_ids {
            if !pending_products.remove(product.as_str()) {
                return Err(SubscriptionMismatch::UnexpectedProduct {
                    channel: name.to_string(),
                    product: product.clone(),
                });
            }
        }
        if !pending_products.is_empty() {
            return Err(SubscriptionMismatch::MissingProducts {
                channel: name.to_string(),
                products: pending_products.iter().map(|p| p.to_string()).collect(),
            });
        }
    }

    if !pending_channels.is_empty() {
        return Err(SubscriptionMismatch::MissingChannels(
            pending_channels.iter().map(|c| c.to_string()).collect(),
        ));
    }

    Ok(())
}

//! Translators from raw feed messages into domain events
//!
//! Pure functions: no I/O, no shared state. Each translator either returns
//! a fully populated event or fails with a `MalformedMessage` naming the
//! missing or invalid field.

use crate::domain::{Currency, Match, Side, Ticker};
use crate::error::MalformedMessage;
use crate::feed::messages::{RawDecimal, RawInt, RawMatch, RawTicker};
use chrono::DateTime;
use serde_json::Value;

/// Translate a `ticker` message.
pub fn ticker(msg: &Value) -> Result<Ticker, MalformedMessage> {
    let raw: RawTicker = deserialize(msg)?;
    let (base, quote) = split_product(raw.product_id.as_deref(), "product_id")?;
    Ok(Ticker {
        timestamp_ms: timestamp_ms(raw.time.as_deref(), "time")?,
        sequence: integer(raw.sequence.as_ref(), "sequence")?,
        base,
        quote,
        best_ask: decimal(raw.best_ask.as_ref(), "best_ask")?,
        best_bid: decimal(raw.best_bid.as_ref(), "best_bid")?,
        last_trade_side: side(raw.side.as_deref(), "side")?,
        last_trade_price: decimal(raw.price.as_ref(), "price")?,
        last_trade_size: decimal(raw.last_size.as_ref(), "last_size")?,
    })
}

/// Translate a `match` message.
pub fn match_event(msg: &Value) -> Result<Match, MalformedMessage> {
    let raw: RawMatch = deserialize(msg)?;
    trade_from_raw(&raw)
}

/// Extract the replay boundary from a `last_match` marker.
pub fn last_match_trade_id(msg: &Value) -> Result<i64, MalformedMessage> {
    let raw: RawMatch = deserialize(msg)?;
    integer(raw.trade_id.as_ref(), "trade_id")
}

/// Derive a publishable Match from a `last_match` marker. The marker carries
/// the most recent completed trade at connection time, so the same payload
/// yields a regular Match event.
pub fn last_match(msg: &Value) -> Result<Match, MalformedMessage> {
    match_event(msg)
}

fn trade_from_raw(raw: &RawMatch) -> Result<Match, MalformedMessage> {
    let (base, quote) = split_product(raw.product_id.as_deref(), "product_id")?;
    Ok(Match {
        timestamp_ms: timestamp_ms(raw.time.as_deref(), "time")?,
        trade_id: integer(raw.trade_id.as_ref(), "trade_id")?,
        base,
        quote,
        side: side(raw.side.as_deref(), "side")?,
        price: decimal(raw.price.as_ref(), "price")?,
        size: decimal(raw.size.as_ref(), "size")?,
    })
}

fn deserialize<T: serde::de::DeserializeOwned>(msg: &Value) -> Result<T, MalformedMessage> {
    serde_json::from_value(msg.clone()).map_err(|e| MalformedMessage::Unparseable(e.to_string()))
}

/// Parse an ISO-8601 timestamp string into epoch milliseconds.
pub(crate) fn timestamp_ms(
    value: Option<&str>,
    field: &'static str,
) -> Result<i64, MalformedMessage> {
    let text = value.ok_or(MalformedMessage::FieldMissing(field))?;
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.timestamp_millis())
        .map_err(|e| MalformedMessage::InvalidField {
            field,
            reason: e.to_string(),
        })
}

/// Split a `BASE-QUOTE` product identifier into its currencies. Exactly two
/// hyphen-delimited parts are required.
pub(crate) fn split_product(
    value: Option<&str>,
    field: &'static str,
) -> Result<(Currency, Currency), MalformedMessage> {
    let id = value.ok_or(MalformedMessage::FieldMissing(field))?;
    let mut parts = id.split('-');
    let (base, quote) = match (parts.next(), parts.next(), parts.next()) {
        (Some(base), Some(quote), None) => (base, quote),
        _ => {
            return Err(MalformedMessage::InvalidField {
                field,
                reason: format!("`{}` is not a BASE-QUOTE pair", id),
            })
        }
    };
    let base = Currency::parse(base).ok_or_else(|| MalformedMessage::InvalidField {
        field,
        reason: format!("unknown currency `{}`", base),
    })?;
    let quote = Currency::parse(quote).ok_or_else(|| MalformedMessage::InvalidField {
        field,
        reason: format!("unknown currency `{}`", quote),
    })?;
    Ok((base, quote))
}

pub(crate) fn side(value: Option<&str>, field: &'static str) -> Result<Side, MalformedMessage> {
    let text = value.ok_or(MalformedMessage::FieldMissing(field))?;
    Side::parse(text).ok_or_else(|| MalformedMessage::InvalidField {
        field,
        reason: format!("unknown side `{}`", text),
    })
}

pub(crate) fn decimal(
    value: Option<&RawDecimal>,
    field: &'static str,
) -> Result<f64, MalformedMessage> {
    let raw = value.ok_or(MalformedMessage::FieldMissing(field))?;
    raw.as_f64().ok_or_else(|| MalformedMessage::InvalidField {
        field,
        reason: "not a number".to_string(),
    })
}

pub(crate) fn integer(
    value: Option<&RawInt>,
    field: &'static str,
) -> Result<i64, MalformedMessage> {
    let raw = value.ok_or(MalformedMessage::FieldMissing(field))?;
    raw.as_i64().ok_or_else(|| MalformedMessage::InvalidField {
        field,
        reason: "not an integer".to_string(),
    })
}

//! Tagged-variant wire messages for the level-2 feed.
//!
//! The four message shapes (`subscribe`, `subscriptions`, `snapshot`,
//! `l2update`) don't share a uniform field set, and an unrecognized `type`
//! must still parse enough to be logged — both rule out a single
//! `#[serde(tag = "type")]` enum derive. Instead the `type` field is read
//! first, then the matching shape is deserialized from the same value.

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::error::Error;
use crate::price_book::Side;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// A single `[side, price, quantity]` change within an `l2update`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Change {
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub product_id: String,
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
    pub time_ms: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct L2Update {
    pub product_id: String,
    pub changes: Vec<Change>,
    pub time_ms: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    Subscriptions,
    Snapshot(Snapshot),
    L2Update(L2Update),
    Unknown(String),
}

/// The outbound subscribe request sent once, right after connecting.
pub fn subscribe_request(product_id: &str) -> String {
    serde_json::json!({
        "type": "subscribe",
        "channels": [{ "name": "level2_batch", "product_ids": [product_id] }],
    })
    .to_string()
}

pub fn parse_inbound(text: &str) -> Result<InboundMessage, Error> {
    let value: Value = serde_json::from_str(text)?;
    let msg_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Parse("message has no \"type\" field".into()))?;

    match msg_type {
        "subscriptions" => Ok(InboundMessage::Subscriptions),
        "snapshot" => parse_snapshot(&value).map(InboundMessage::Snapshot),
        "l2update" => parse_l2update(&value).map(InboundMessage::L2Update),
        other => Ok(InboundMessage::Unknown(other.to_string())),
    }
}

fn parse_time(value: &Value) -> Result<i64, Error> {
    let raw = value
        .get("time")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Parse("message has no \"time\" field".into()))?;
    let naive = NaiveDateTime::parse_from_str(raw, TIME_FORMAT)?;
    Ok(naive.and_utc().timestamp_millis())
}

fn parse_price_qty_pairs(value: &Value, field: &str) -> Result<Vec<(f64, f64)>, Error> {
    let arr = value
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Parse(format!("message has no \"{field}\" array")))?;

    arr.iter()
        .map(|pair| {
            let pair = pair
                .as_array()
                .ok_or_else(|| Error::Parse(format!("\"{field}\" entry is not an array")))?;
            let price = parse_decimal_str(pair.first())?;
            let qty = parse_decimal_str(pair.get(1))?;
            Ok((price, qty))
        })
        .collect()
}

fn parse_decimal_str(value: Option<&Value>) -> Result<f64, Error> {
    let s = value
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Parse("expected a decimal string".into()))?;
    Ok(s.parse::<f64>()?)
}

fn parse_snapshot(value: &Value) -> Result<Snapshot, Error> {
    Ok(Snapshot {
        product_id: value
            .get("product_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        bids: parse_price_qty_pairs(value, "bids")?,
        asks: parse_price_qty_pairs(value, "asks")?,
        time_ms: parse_time(value)?,
    })
}

fn parse_l2update(value: &Value) -> Result<L2Update, Error> {
    let changes_arr = value
        .get("changes")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Parse("message has no \"changes\" array".into()))?;

    let changes = changes_arr
        .iter()
        .map(|change| {
            let change = change
                .as_array()
                .ok_or_else(|| Error::Parse("\"changes\" entry is not an array".into()))?;
            let side = match change.first().and_then(Value::as_str) {
                Some("buy") => Side::Bid,
                Some("sell") => Side::Ask,
                Some(other) => return Err(Error::Parse(format!("unknown side: {other}"))),
                None => return Err(Error::Parse("missing side in change".into())),
            };
            let price = parse_decimal_str(change.get(1))?;
            let quantity = parse_decimal_str(change.get(2))?;
            Ok(Change { side, price, quantity })
        })
        .collect::<Result<Vec<_>, Error>>()?;

    Ok(L2Update {
        product_id: value
            .get("product_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        changes,
        time_ms: parse_time(value)?,
    })
}

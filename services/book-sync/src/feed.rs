//! Venue wire codec
//!
//! Turns raw JSON from the full-channel feed and the level-3 REST book into
//! typed `BookEvent`s and `BookSnapshot`s. Numbers arrive as decimal strings;
//! they are parsed straight into fixed-point values, never through floats.
//!
//! A message that cannot be typed yields `MalformedEventError`. The caller
//! skips it and keeps going.

use std::str::FromStr;

use chrono::DateTime;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};
use types::order::{OrderType, Side};

use crate::events::{BookEvent, BookSnapshot, DoneReason, EventPayload, SnapshotEntry};

/// A feed message or snapshot body that could not be typed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedEventError {
    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("missing field `{field}` (sequence {sequence:?})")]
    MissingField {
        sequence: Option<u64>,
        field: &'static str,
    },

    #[error("invalid value {value:?} for field `{field}` (sequence {sequence:?})")]
    InvalidField {
        sequence: Option<u64>,
        field: &'static str,
        value: String,
    },
}

impl MalformedEventError {
    /// Sequence of the offending message, when it got that far.
    pub fn sequence(&self) -> Option<u64> {
        match self {
            MalformedEventError::Json(_) => None,
            MalformedEventError::MissingField { sequence, .. }
            | MalformedEventError::InvalidField { sequence, .. } => *sequence,
        }
    }
}

/// Raw feed message. Every field is optional on the wire; the type decides
/// which ones must be present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub sequence: Option<u64>,
    pub time: Option<String>,
    pub product_id: Option<String>,
    pub order_id: Option<String>,
    pub side: Option<String>,
    pub price: Option<String>,
    pub size: Option<String>,
    pub remaining_size: Option<String>,
    pub order_type: Option<String>,
    pub reason: Option<String>,
    pub trade_id: Option<u64>,
    pub maker_order_id: Option<String>,
    pub taker_order_id: Option<String>,
    pub new_size: Option<String>,
    pub old_size: Option<String>,
    pub new_funds: Option<String>,
    pub old_funds: Option<String>,
}

/// Parse one JSON feed message into a typed event.
pub fn parse_event(json: &str) -> Result<BookEvent, MalformedEventError> {
    let message: FeedMessage =
        serde_json::from_str(json).map_err(|e| MalformedEventError::Json(e.to_string()))?;
    BookEvent::try_from(message)
}

impl TryFrom<FeedMessage> for BookEvent {
    type Error = MalformedEventError;

    fn try_from(msg: FeedMessage) -> Result<Self, Self::Error> {
        let sequence = msg.sequence.ok_or(MalformedEventError::MissingField {
            sequence: None,
            field: "sequence",
        })?;
        let fields = Fields { msg: &msg, sequence };
        let timestamp = fields.timestamp()?;

        let payload = match msg.kind.as_str() {
            "open" => EventPayload::Open {
                order_id: fields.order_id("order_id", &msg.order_id)?,
                side: fields.parse("side", &msg.side)?,
                price: fields.parse("price", &msg.price)?,
                remaining_size: fields.parse("remaining_size", &msg.remaining_size)?,
            },
            "received" => {
                let order_type = OrderType::parse(fields.required("order_type", &msg.order_type)?);
                let (price, size) = if order_type.rests() {
                    (
                        Some(fields.parse("price", &msg.price)?),
                        Some(fields.parse("size", &msg.size)?),
                    )
                } else {
                    (
                        fields.parse_optional("price", &msg.price)?,
                        fields.parse_optional("size", &msg.size)?,
                    )
                };
                EventPayload::Received {
                    order_id: fields.order_id("order_id", &msg.order_id)?,
                    side: fields.parse("side", &msg.side)?,
                    order_type,
                    price,
                    size,
                }
            }
            "done" => EventPayload::Done {
                order_id: fields.order_id("order_id", &msg.order_id)?,
                side: fields.parse("side", &msg.side)?,
                reason: match msg.reason.as_deref() {
                    Some("filled") => DoneReason::Filled,
                    Some("canceled") => DoneReason::Canceled,
                    _ => DoneReason::Other,
                },
                price: fields.parse_optional("price", &msg.price)?,
                remaining_size: fields.parse_optional("remaining_size", &msg.remaining_size)?,
            },
            "match" => EventPayload::Match {
                trade_id: msg.trade_id,
                maker_order_id: fields.order_id("maker_order_id", &msg.maker_order_id)?,
                taker_order_id: fields.order_id("taker_order_id", &msg.taker_order_id)?,
                side: fields.parse("side", &msg.side)?,
                price: fields.parse("price", &msg.price)?,
                size: fields.parse("size", &msg.size)?,
            },
            // Market orders amend funds, not size.
            "change" if msg.new_size.is_none() && msg.new_funds.is_some() => {
                EventPayload::FundsChange {
                    order_id: fields.order_id("order_id", &msg.order_id)?,
                    side: fields.parse("side", &msg.side)?,
                    new_funds: fields.parse("new_funds", &msg.new_funds)?,
                    old_funds: fields.parse_optional("old_funds", &msg.old_funds)?,
                }
            }
            "change" => EventPayload::Change {
                order_id: fields.order_id("order_id", &msg.order_id)?,
                side: fields.parse("side", &msg.side)?,
                price: fields.parse_optional("price", &msg.price)?,
                new_size: fields.parse("new_size", &msg.new_size)?,
                old_size: fields.parse_optional("old_size", &msg.old_size)?,
            },
            other => EventPayload::Unknown {
                kind: other.to_string(),
            },
        };

        Ok(BookEvent::new(sequence, timestamp, payload))
    }
}

/// Field accessors that tag every failure with the message's sequence.
struct Fields<'a> {
    msg: &'a FeedMessage,
    sequence: u64,
}

impl<'a> Fields<'a> {
    fn required<'v>(
        &self,
        field: &'static str,
        value: &'v Option<String>,
    ) -> Result<&'v str, MalformedEventError> {
        value.as_deref().ok_or(MalformedEventError::MissingField {
            sequence: Some(self.sequence),
            field,
        })
    }

    fn parse<T: FromStr>(
        &self,
        field: &'static str,
        value: &Option<String>,
    ) -> Result<T, MalformedEventError> {
        let raw = self.required(field, value)?;
        raw.parse().map_err(|_| self.invalid(field, raw))
    }

    fn parse_optional<T: FromStr>(
        &self,
        field: &'static str,
        value: &Option<String>,
    ) -> Result<Option<T>, MalformedEventError> {
        value
            .as_deref()
            .map(|raw| raw.parse().map_err(|_| self.invalid(field, raw)))
            .transpose()
    }

    fn order_id(
        &self,
        field: &'static str,
        value: &Option<String>,
    ) -> Result<OrderId, MalformedEventError> {
        let raw = self.required(field, value)?;
        OrderId::try_new(raw).ok_or_else(|| self.invalid(field, raw))
    }

    fn timestamp(&self) -> Result<i64, MalformedEventError> {
        match self.msg.time.as_deref() {
            None => Ok(0),
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .ok()
                .and_then(|t| t.timestamp_nanos_opt())
                .ok_or_else(|| self.invalid("time", raw)),
        }
    }

    fn invalid(&self, field: &'static str, raw: &str) -> MalformedEventError {
        MalformedEventError::InvalidField {
            sequence: Some(self.sequence),
            field,
            value: raw.to_string(),
        }
    }
}

/// A decimal that may arrive as a JSON string or a JSON number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireDecimal {
    Text(String),
    Number(serde_json::Number),
}

impl WireDecimal {
    fn text(&self) -> String {
        match self {
            WireDecimal::Text(s) => s.clone(),
            WireDecimal::Number(n) => n.to_string(),
        }
    }

    /// Float-typed numbers may render in exponent form (`1e-7`).
    fn decimal(&self) -> Option<Decimal> {
        let text = self.text();
        match self {
            WireDecimal::Text(_) => Decimal::from_str(text.trim()).ok(),
            WireDecimal::Number(_) => Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok(),
        }
    }
}

/// One order on a REST book: either `[price, size, order_id]` or an object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireEntry {
    Tuple(WireDecimal, WireDecimal, String),
    Object {
        #[serde(alias = "orderId")]
        order_id: String,
        price: WireDecimal,
        size: WireDecimal,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct WireSnapshot {
    sequence: u64,
    #[serde(default)]
    bids: Vec<WireEntry>,
    #[serde(default)]
    asks: Vec<WireEntry>,
}

/// Parse a level-3 REST book body into a typed snapshot.
pub fn parse_snapshot(json: &str) -> Result<BookSnapshot, MalformedEventError> {
    let wire: WireSnapshot =
        serde_json::from_str(json).map_err(|e| MalformedEventError::Json(e.to_string()))?;
    let sequence = wire.sequence;

    let convert = |entries: Vec<WireEntry>| -> Result<Vec<SnapshotEntry>, MalformedEventError> {
        entries
            .into_iter()
            .map(|entry| snapshot_entry(entry, sequence))
            .collect()
    };

    Ok(BookSnapshot {
        sequence,
        bids: convert(wire.bids)?,
        asks: convert(wire.asks)?,
    })
}

fn snapshot_entry(entry: WireEntry, sequence: u64) -> Result<SnapshotEntry, MalformedEventError> {
    let (order_id, price, size) = match entry {
        WireEntry::Tuple(price, size, order_id) => (order_id, price, size),
        WireEntry::Object {
            order_id,
            price,
            size,
        } => (order_id, price, size),
    };
    let invalid = |field: &'static str, value: String| MalformedEventError::InvalidField {
        sequence: Some(sequence),
        field,
        value,
    };

    Ok(SnapshotEntry {
        price: price
            .decimal()
            .and_then(Price::try_new)
            .ok_or_else(|| invalid("price", price.text()))?,
        size: size
            .decimal()
            .and_then(Quantity::try_new)
            .ok_or_else(|| invalid("size", size.text()))?,
        order_id: OrderId::try_new(order_id).ok_or_else(|| invalid("order_id", String::new()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_received_limit() {
        let json = r#"{
            "type": "received",
            "time": "2014-11-07T08:19:27.028459Z",
            "product_id": "BTC-USD",
            "sequence": 101,
            "order_id": "c",
            "size": "0.5",
            "price": "100.50",
            "side": "buy",
            "order_type": "limit"
        }"#;
        let event = parse_event(json).unwrap();
        assert_eq!(event.sequence, 101);
        assert!(event.timestamp > 0);
        let order = event.resting_order().unwrap();
        assert_eq!(order.order_id.as_str(), "c");
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.size, "0.5".parse().unwrap());
    }

    #[test]
    fn test_parse_received_market_without_price() {
        let json = r#"{"type":"received","sequence":7,"order_id":"m","side":"sell","order_type":"market","funds":"3000.23"}"#;
        let event = parse_event(json).unwrap();
        assert!(event.resting_order().is_none());
        assert!(matches!(
            event.payload,
            EventPayload::Received { order_type: OrderType::Market, price: None, size: None, .. }
        ));
    }

    #[test]
    fn test_parse_received_limit_missing_price() {
        let json = r#"{"type":"received","sequence":9,"order_id":"x","side":"buy","order_type":"limit","size":"1"}"#;
        assert_eq!(
            parse_event(json),
            Err(MalformedEventError::MissingField {
                sequence: Some(9),
                field: "price"
            })
        );
    }

    #[test]
    fn test_parse_done_and_match_and_change() {
        let done = parse_event(
            r#"{"type":"done","sequence":10,"order_id":"a","side":"buy","reason":"canceled","price":"100.50","remaining_size":"1.0"}"#,
        )
        .unwrap();
        assert!(matches!(done.payload, EventPayload::Done { reason: DoneReason::Canceled, .. }));

        let matched = parse_event(
            r#"{"type":"match","sequence":11,"trade_id":10,"maker_order_id":"b","taker_order_id":"t","side":"sell","size":"0.5","price":"101.00"}"#,
        )
        .unwrap();
        assert!(matches!(matched.payload, EventPayload::Match { trade_id: Some(10), .. }));

        let change = parse_event(
            r#"{"type":"change","sequence":12,"order_id":"b","side":"sell","price":"101.00","new_size":"0.2","old_size":"1.5"}"#,
        )
        .unwrap();
        assert_eq!(change.event_type_label(), "change");
    }

    #[test]
    fn test_parse_funds_only_change() {
        let event = parse_event(
            r#"{"type":"change","sequence":14,"order_id":"m","side":"buy","new_funds":"5.23","old_funds":"10.00"}"#,
        )
        .unwrap();
        assert_eq!(event.event_type_label(), "change");
        assert!(matches!(
            event.payload,
            EventPayload::FundsChange { old_funds: Some(_), .. }
        ));

        // Neither size nor funds is still malformed.
        assert_eq!(
            parse_event(r#"{"type":"change","sequence":15,"order_id":"m","side":"buy"}"#),
            Err(MalformedEventError::MissingField {
                sequence: Some(15),
                field: "new_size"
            })
        );
    }

    #[test]
    fn test_parse_unknown_type_is_not_an_error() {
        let event = parse_event(r#"{"type":"activate","sequence":13}"#).unwrap();
        assert_eq!(event.event_type_label(), "activate");
    }

    #[test]
    fn test_parse_malformed_inputs() {
        assert!(matches!(parse_event("{not json"), Err(MalformedEventError::Json(_))));
        assert_eq!(
            parse_event(r#"{"type":"done","order_id":"a","side":"buy"}"#),
            Err(MalformedEventError::MissingField {
                sequence: None,
                field: "sequence"
            })
        );

        let bad_side = parse_event(r#"{"type":"done","sequence":5,"order_id":"a","side":"long"}"#);
        assert_eq!(bad_side.unwrap_err().sequence(), Some(5));

        let bad_time = parse_event(r#"{"type":"activate","sequence":6,"time":"yesterday"}"#);
        assert!(matches!(bad_time, Err(MalformedEventError::InvalidField { field: "time", .. })));
    }

    #[test]
    fn test_parse_snapshot_tuple_form() {
        let json = r#"{
            "sequence": 100,
            "bids": [["100.50", "1.0", "a"]],
            "asks": [["101.00", "2.0", "b"]]
        }"#;
        let snapshot = parse_snapshot(json).unwrap();
        assert_eq!(snapshot.sequence, 100);
        assert_eq!(snapshot.bids[0].order_id.as_str(), "a");
        assert_eq!(snapshot.asks[0].price, "101.00".parse().unwrap());
    }

    #[test]
    fn test_parse_snapshot_object_form_with_numbers() {
        let json = r#"{
            "sequence": 100,
            "bids": [{"orderId": "a", "price": 100.50, "size": 1.0}],
            "asks": [{"order_id": "b", "price": "101.00", "size": "2.0"}]
        }"#;
        let snapshot = parse_snapshot(json).unwrap();
        assert_eq!(snapshot.bids[0].price, "100.5".parse().unwrap());
        assert_eq!(snapshot.asks[0].order_id.as_str(), "b");
    }

    #[test]
    fn test_parse_snapshot_numbers_in_exponent_form() {
        let json = r#"{
            "sequence": 100,
            "bids": [[0.0000001, 2.5e-5, "a"]],
            "asks": [{"order_id": "b", "price": 1.5E3, "size": 3}]
        }"#;
        let snapshot = parse_snapshot(json).unwrap();
        assert_eq!(snapshot.bids[0].price, "0.0000001".parse().unwrap());
        assert_eq!(snapshot.bids[0].size, "0.000025".parse().unwrap());
        assert_eq!(snapshot.asks[0].price, "1500".parse().unwrap());
        assert_eq!(snapshot.asks[0].size, "3".parse().unwrap());
    }

    #[test]
    fn test_parse_snapshot_rejects_bad_price() {
        let json = r#"{"sequence": 100, "bids": [["-1", "1.0", "a"]], "asks": []}"#;
        assert!(matches!(
            parse_snapshot(json),
            Err(MalformedEventError::InvalidField { field: "price", sequence: Some(100), .. })
        ));
    }
}

//! Typed feed events and snapshots
//!
//! `BookEvent` is the parsed form of one diff message from the venue feed.
//! Every event carries the venue sequence number; the payload carries only
//! the fields its type defines. `BookSnapshot` is the parsed REST book.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::OrderId;
use types::numeric::{Price, Quantity};
use types::order::{LimitOrder, OrderType, Side};

/// One diff event from the venue feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookEvent {
    /// Venue sequence number.
    pub sequence: u64,
    /// Unix nanoseconds from the venue clock (0 if the venue omitted it).
    pub timestamp: i64,
    /// Event-specific payload
    pub payload: EventPayload,
}

/// Why an order left the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoneReason {
    Filled,
    Canceled,
    #[serde(other)]
    Other,
}

/// Event-specific payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Order is now resting on the book. Informational only.
    Open {
        order_id: OrderId,
        side: Side,
        price: Price,
        remaining_size: Quantity,
    },

    /// Venue accepted an order. Limit orders rest; others never do.
    Received {
        order_id: OrderId,
        side: Side,
        order_type: OrderType,
        price: Option<Price>,
        size: Option<Quantity>,
    },

    /// Order left the book (full fill or cancel).
    Done {
        order_id: OrderId,
        side: Side,
        reason: DoneReason,
        price: Option<Price>,
        remaining_size: Option<Quantity>,
    },

    /// A taker traded against a resting maker.
    Match {
        trade_id: Option<u64>,
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        /// Maker side
        side: Side,
        price: Price,
        size: Quantity,
    },

    /// Resting order size amended in place.
    Change {
        order_id: OrderId,
        side: Side,
        price: Option<Price>,
        new_size: Quantity,
        old_size: Option<Quantity>,
    },

    /// Market order funds amended. Nothing rests, so the book is untouched.
    FundsChange {
        order_id: OrderId,
        side: Side,
        new_funds: Decimal,
        old_funds: Option<Decimal>,
    },

    /// Any type this mirror does not understand.
    Unknown { kind: String },
}

impl BookEvent {
    pub fn new(sequence: u64, timestamp: i64, payload: EventPayload) -> Self {
        Self {
            sequence,
            timestamp,
            payload,
        }
    }

    /// Get the event type as a string label for logging.
    pub fn event_type_label(&self) -> &str {
        match &self.payload {
            EventPayload::Open { .. } => "open",
            EventPayload::Received { .. } => "received",
            EventPayload::Done { .. } => "done",
            EventPayload::Match { .. } => "match",
            EventPayload::Change { .. } | EventPayload::FundsChange { .. } => "change",
            EventPayload::Unknown { kind } => kind.as_str(),
        }
    }

    /// The order this event would rest on the book, if any.
    ///
    /// Only `received` limit orders with both price and size qualify.
    pub fn resting_order(&self) -> Option<LimitOrder> {
        match &self.payload {
            EventPayload::Received {
                order_id,
                side,
                order_type,
                price: Some(price),
                size: Some(size),
            } if order_type.rests() => Some(LimitOrder::new(order_id.clone(), *side, *price, *size)),
            _ => None,
        }
    }
}

/// One order in a REST book snapshot. Side comes from the list it is in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub order_id: OrderId,
    pub price: Price,
    pub size: Quantity,
}

impl SnapshotEntry {
    pub fn to_order(&self, side: Side) -> LimitOrder {
        LimitOrder::new(self.order_id.clone(), side, self.price, self.size)
    }
}

/// Point-in-time full book, valid as of `sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub sequence: u64,
    pub bids: Vec<SnapshotEntry>,
    pub asks: Vec<SnapshotEntry>,
}

impl BookSnapshot {
    /// Total number of orders across both sides.
    pub fn order_count(&self) -> usize {
        self.bids.len() + self.asks.len()
    }
}

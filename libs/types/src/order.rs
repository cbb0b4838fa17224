//! Order types for the mirrored book
//!
//! Only resting limit orders live in the book. Other order types appear on
//! the feed but never rest.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::TypeError;
use crate::ids::OrderId;
use crate::numeric::{Price, Quantity};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy order (bid)
    Buy,
    /// Sell order (ask)
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl FromStr for Side {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" | "BUY" => Ok(Side::Buy),
            "sell" | "SELL" => Ok(Side::Sell),
            other => Err(TypeError::InvalidSide(other.to_string())),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type as reported on `received` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
    #[serde(other)]
    Other,
}

impl OrderType {
    /// Parse leniently: unknown types map to `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "limit" => OrderType::Limit,
            "market" => OrderType::Market,
            _ => OrderType::Other,
        }
    }

    /// Whether orders of this type can rest on the book.
    pub fn rests(&self) -> bool {
        matches!(self, OrderType::Limit)
    }
}

/// A limit order resting on one side of the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub size: Quantity,
}

impl LimitOrder {
    pub fn new(order_id: impl Into<OrderId>, side: Side, price: Price, size: Quantity) -> Self {
        Self {
            order_id: order_id.into(),
            side,
            price,
            size,
        }
    }
}

//! Trade notifications
//!
//! Every applied `match` yields a `TradeObservation`. Observations are pushed
//! to consumers through a bounded channel with `try_send`: a full or closed
//! channel drops the observation rather than stalling the writer.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use types::ids::OrderId;
use types::numeric::{Price, Quantity};
use types::order::Side;

use crate::metrics::SyncMetrics;

/// A trade seen on the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeObservation {
    /// Feed sequence of the `match` event.
    pub sequence: u64,
    pub trade_id: Option<u64>,
    pub price: Price,
    pub size: Quantity,
    /// Maker side
    pub side: Side,
    /// Unix nanos from the venue clock.
    pub time: i64,
    pub maker_order_id: OrderId,
}

impl TradeObservation {
    /// Side of the aggressor that crossed the spread.
    pub fn taker_side(&self) -> Side {
        self.side.opposite()
    }

    /// Trade value (price × size).
    pub fn notional(&self) -> Decimal {
        self.price.as_decimal() * self.size.as_decimal()
    }
}

/// Non-blocking sender half of the trade channel.
#[derive(Debug, Clone)]
pub struct TradePublisher {
    tx: mpsc::Sender<TradeObservation>,
    metrics: Arc<SyncMetrics>,
}

/// Create a bounded trade channel.
pub fn trade_channel(
    capacity: usize,
    metrics: Arc<SyncMetrics>,
) -> (TradePublisher, mpsc::Receiver<TradeObservation>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (TradePublisher { tx, metrics }, rx)
}

impl TradePublisher {
    /// Offer an observation to consumers. Returns whether it was delivered.
    pub fn publish(&self, trade: TradeObservation) -> bool {
        match self.tx.try_send(trade) {
            Ok(()) => {
                self.metrics.record_trade_published();
                true
            }
            Err(mpsc::error::TrySendError::Full(trade)) => {
                self.metrics.record_trade_dropped();
                warn!(
                    sequence = trade.sequence,
                    price = %trade.price,
                    "Trade channel full, dropping observation"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(trade)) => {
                self.metrics.record_trade_dropped();
                debug!(sequence = trade.sequence, "Trade channel closed");
                false
            }
        }
    }

    /// Whether every receiver has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_trade(seq: u64) -> TradeObservation {
        TradeObservation {
            sequence: seq,
            trade_id: Some(seq),
            price: Price::from_u64(50000),
            size: "0.5".parse().unwrap(),
            side: Side::Sell,
            time: 1_708_123_456_789_000_000,
            maker_order_id: OrderId::new("m"),
        }
    }

    #[test]
    fn test_notional_and_taker_side() {
        let trade = make_trade(1);
        assert_eq!(trade.notional(), Decimal::from(25000));
        assert_eq!(trade.taker_side(), Side::Buy);
    }

    #[tokio::test]
    async fn test_publish_delivers() {
        let metrics = Arc::new(SyncMetrics::new());
        let (publisher, mut rx) = trade_channel(4, metrics.clone());

        assert!(publisher.publish(make_trade(1)));
        assert_eq!(rx.recv().await.map(|t| t.sequence), Some(1));
        assert_eq!(metrics.export()["trades_published"], 1);
    }

    #[tokio::test]
    async fn test_publish_drops_when_full() {
        let metrics = Arc::new(SyncMetrics::new());
        let (publisher, mut rx) = trade_channel(2, metrics.clone());

        assert!(publisher.publish(make_trade(1)));
        assert!(publisher.publish(make_trade(2)));
        assert!(!publisher.publish(make_trade(3)));

        assert_eq!(rx.recv().await.map(|t| t.sequence), Some(1));
        assert_eq!(rx.recv().await.map(|t| t.sequence), Some(2));
        assert_eq!(metrics.export()["trades_dropped"], 1);
    }

    #[test]
    fn test_publish_to_closed_channel() {
        let metrics = Arc::new(SyncMetrics::new());
        let (publisher, rx) = trade_channel(2, metrics.clone());
        drop(rx);

        assert!(publisher.is_closed());
        assert!(!publisher.publish(make_trade(1)));
        assert_eq!(metrics.export()["trades_dropped"], 1);
    }

    #[test]
    fn test_trade_serialization() {
        let trade = make_trade(7);
        let json = serde_json::to_string(&trade).unwrap();
        let deserialized: TradeObservation = serde_json::from_str(&json).unwrap();
        assert_eq!(trade, deserialized);
    }
}

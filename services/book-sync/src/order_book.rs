//! In-memory order book mirror
//!
//! Maintains the venue's resting limit orders, aggregated per price level.
//! Uses `BTreeMap` keyed by `Price` so best-price lookups and ordered depth
//! walks are O(log L), and a flat id index for O(1) order lookup.
//!
//! Invariants after every mutation:
//! - every indexed order sits in exactly one level, on its own side, at its
//!   own price
//! - no level is empty
//! - `last_sequence` never decreases

use std::collections::btree_map;
use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::{MarketId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::{LimitOrder, Side};

use crate::error::BookError;
use crate::events::SnapshotEntry;
use crate::price_level::PriceLevel;

/// Aggregated, serializable view of one price level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSummary {
    /// The price of this level.
    pub price: Price,
    /// Total size at this level across all orders.
    pub total_size: Quantity,
    /// Number of orders resting at this level.
    pub order_count: usize,
}

impl From<&PriceLevel> for LevelSummary {
    fn from(level: &PriceLevel) -> Self {
        Self {
            price: level.price(),
            total_size: level.total_size(),
            order_count: level.order_count(),
        }
    }
}

/// In-memory order book mirror for a single product.
///
/// Bids are walked in descending price order (best bid first).
/// Asks are walked in ascending price order (best ask first).
#[derive(Debug, Clone)]
pub struct OrderBook {
    /// Product symbol.
    pub symbol: MarketId,
    bids: BTreeMap<Price, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
    /// Every resting order by id.
    orders: HashMap<OrderId, LimitOrder>,
    /// Sequence of the last applied event or snapshot.
    last_sequence: u64,
    snapshot_loaded: bool,
}

impl OrderBook {
    /// Create an empty order book for the given symbol.
    pub fn new(symbol: MarketId) -> Self {
        Self {
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: HashMap::new(),
            last_sequence: 0,
            snapshot_loaded: false,
        }
    }

    /// Insert a resting order.
    ///
    /// An id that is already present is replaced: the prior entry leaves its
    /// level first, so an id never sits in two levels. Returns the replaced
    /// order.
    pub fn add_order(&mut self, order: LimitOrder) -> Option<LimitOrder> {
        let replaced = self.remove_order(order.order_id.as_str()).ok();

        self.levels_mut(order.side)
            .entry(order.price)
            .or_insert_with(|| PriceLevel::new(order.price))
            .add(order.clone());
        self.orders.insert(order.order_id.clone(), order);

        replaced
    }

    /// Remove a resting order (cancel or full fill).
    ///
    /// Deletes the level if it became empty.
    pub fn remove_order(&mut self, order_id: &str) -> Result<LimitOrder, BookError> {
        let order = self
            .orders
            .remove(order_id)
            .ok_or_else(|| BookError::OrderNotFound(OrderId::new(order_id)))?;

        let levels = self.levels_mut(order.side);
        if let btree_map::Entry::Occupied(mut level) = levels.entry(order.price) {
            if level.get_mut().remove(order_id) {
                level.remove();
            }
        }

        Ok(order)
    }

    /// Reduce a resting order by a filled amount.
    ///
    /// Fills larger than the remaining size clamp to zero. An order reduced
    /// to zero is removed. Returns the remaining size.
    pub fn reduce_order(&mut self, order_id: &str, filled: Quantity) -> Result<Quantity, BookError> {
        let current = self
            .orders
            .get(order_id)
            .map(|o| o.size)
            .ok_or_else(|| BookError::OrderNotFound(OrderId::new(order_id)))?;

        let remaining = current.saturating_sub(filled);
        self.resize_order(order_id, remaining)?;
        Ok(remaining)
    }

    /// Amend a resting order's size in place, keeping its price and side.
    ///
    /// A new size of zero removes the order. Returns the previous size.
    pub fn resize_order(&mut self, order_id: &str, new_size: Quantity) -> Result<Quantity, BookError> {
        if new_size.is_zero() {
            return self.remove_order(order_id).map(|o| o.size);
        }

        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| BookError::OrderNotFound(OrderId::new(order_id)))?;
        let old = order.size;
        order.size = new_size;
        let (side, price) = (order.side, order.price);

        if let Some(level) = self.levels_mut(side).get_mut(&price) {
            level.set_size(order_id, new_size);
        }

        Ok(old)
    }

    /// Bulk-load a point-in-time snapshot into an empty book.
    ///
    /// May be called once per book, before any event is applied.
    pub fn load_snapshot(
        &mut self,
        sequence: u64,
        bids: &[SnapshotEntry],
        asks: &[SnapshotEntry],
    ) -> Result<(), BookError> {
        if self.snapshot_loaded || self.last_sequence > 0 {
            return Err(BookError::SnapshotAlreadyLoaded {
                sequence: self.last_sequence,
            });
        }

        for entry in bids {
            self.add_order(entry.to_order(Side::Buy));
        }
        for entry in asks {
            self.add_order(entry.to_order(Side::Sell));
        }

        self.snapshot_loaded = true;
        self.last_sequence = sequence;
        Ok(())
    }

    /// Record that the event at `sequence` has been applied.
    ///
    /// Sequences below the current one are ignored.
    pub fn mark_applied(&mut self, sequence: u64) {
        debug_assert!(sequence >= self.last_sequence, "sequence moved backwards");
        self.last_sequence = self.last_sequence.max(sequence);
    }

    /// Highest bid price.
    pub fn best_bid(&self) -> Result<Price, BookError> {
        self.bids
            .keys()
            .next_back()
            .copied()
            .ok_or(BookError::EmptyBook(Side::Buy))
    }

    /// Lowest ask price.
    pub fn best_ask(&self) -> Result<Price, BookError> {
        self.asks
            .keys()
            .next()
            .copied()
            .ok_or(BookError::EmptyBook(Side::Sell))
    }

    /// Average of best bid and best ask.
    pub fn mid_price(&self) -> Result<Decimal, BookError> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        Ok((bid.as_decimal() + ask.as_decimal()) / Decimal::from(2))
    }

    /// Best ask minus best bid.
    pub fn spread(&self) -> Result<Decimal, BookError> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        Ok(ask.as_decimal() - bid.as_decimal())
    }

    /// The `n` best levels on `side`, best first.
    ///
    /// Lazy and finite; call again (or clone the iterator) to restart.
    pub fn depth(&self, n: usize, side: Side) -> Depth<'_> {
        let levels = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        Depth {
            inner: levels.values(),
            side,
            remaining: n,
        }
    }

    /// Look up a resting order by id.
    pub fn lookup_order(&self, order_id: &str) -> Option<&LimitOrder> {
        self.orders.get(order_id)
    }

    /// The level at an exact price, if one exists.
    pub fn level(&self, side: Side, price: Price) -> Option<&PriceLevel> {
        match side {
            Side::Buy => self.bids.get(&price),
            Side::Sell => self.asks.get(&price),
        }
    }

    /// Build a depth snapshot with the specified max levels per side.
    pub fn depth_snapshot(&self, max_levels: usize) -> DepthSnapshot {
        DepthSnapshot {
            symbol: self.symbol.clone(),
            bids: self.depth(max_levels, Side::Buy).map(LevelSummary::from).collect(),
            asks: self.depth(max_levels, Side::Sell).map(LevelSummary::from).collect(),
            last_sequence: self.last_sequence,
        }
    }

    /// Number of bid price levels.
    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    /// Number of ask price levels.
    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    /// Total number of resting orders tracked.
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Last applied sequence number.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn is_snapshot_loaded(&self) -> bool {
        self.snapshot_loaded
    }

    /// All bid levels (descending price order).
    pub fn bid_levels(&self) -> Vec<LevelSummary> {
        self.depth(usize::MAX, Side::Buy).map(LevelSummary::from).collect()
    }

    /// All ask levels (ascending price order).
    pub fn ask_levels(&self) -> Vec<LevelSummary> {
        self.depth(usize::MAX, Side::Sell).map(LevelSummary::from).collect()
    }

    /// Check the structural invariants. Used by tests and replay diagnostics.
    pub fn is_consistent(&self) -> bool {
        let indexed_in_levels = self.orders.values().all(|order| {
            self.level(order.side, order.price)
                .and_then(|level| level.get(order.order_id.as_str()))
                .is_some_and(|resting| resting == order)
        });

        let levels_well_formed = [(&self.bids, Side::Buy), (&self.asks, Side::Sell)]
            .into_iter()
            .all(|(levels, side)| {
                levels.iter().all(|(price, level)| {
                    let sum = level
                        .orders()
                        .fold(Quantity::zero(), |acc, o| acc + o.size);
                    !level.is_empty()
                        && *price == level.price()
                        && sum == level.total_size()
                        && level.orders().all(|o| {
                            o.side == side
                                && self.orders.contains_key(o.order_id.as_str())
                        })
                })
            });

        let level_orders: usize = self
            .bids
            .values()
            .chain(self.asks.values())
            .map(PriceLevel::order_count)
            .sum();

        indexed_in_levels && levels_well_formed && level_orders == self.orders.len()
    }

    fn levels_mut(&mut self, side: Side) -> &mut BTreeMap<Price, PriceLevel> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }
}

/// Iterator over the best levels of one side, best first.
#[derive(Debug, Clone)]
pub struct Depth<'a> {
    inner: btree_map::Values<'a, Price, PriceLevel>,
    side: Side,
    remaining: usize,
}

impl<'a> Iterator for Depth<'a> {
    type Item = &'a PriceLevel;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let level = match self.side {
            Side::Buy => self.inner.next_back(),
            Side::Sell => self.inner.next(),
        }?;
        self.remaining -= 1;
        Some(level)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.inner.len().min(self.remaining);
        (n, Some(n))
    }
}

/// A snapshot of the order book depth at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub symbol: MarketId,
    /// Bids in descending price order (best first).
    pub bids: Vec<LevelSummary>,
    /// Asks in ascending price order (best first).
    pub asks: Vec<LevelSummary>,
    /// Sequence number at the time of the snapshot.
    pub last_sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_book() -> OrderBook {
        OrderBook::new(MarketId::new("BTC-USD"))
    }

    fn qty(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    fn px(s: &str) -> Price {
        s.parse().unwrap()
    }

    fn bid(id: &str, price: &str, size: &str) -> LimitOrder {
        LimitOrder::new(id, Side::Buy, px(price), qty(size))
    }

    fn ask(id: &str, price: &str, size: &str) -> LimitOrder {
        LimitOrder::new(id, Side::Sell, px(price), qty(size))
    }

    fn entry(id: &str, price: &str, size: &str) -> SnapshotEntry {
        SnapshotEntry {
            order_id: OrderId::new(id),
            price: px(price),
            size: qty(size),
        }
    }

    #[test]
    fn test_empty_book() {
        let book = make_book();
        assert_eq!(book.bid_depth(), 0);
        assert_eq!(book.ask_depth(), 0);
        assert_eq!(book.best_bid(), Err(BookError::EmptyBook(Side::Buy)));
        assert_eq!(book.best_ask(), Err(BookError::EmptyBook(Side::Sell)));
        assert!(book.mid_price().is_err());
        assert!(book.spread().is_err());
    }

    #[test]
    fn test_add_order_bid_and_ask() {
        let mut book = make_book();
        book.add_order(bid("a", "100.50", "1.0"));
        book.add_order(ask("b", "101.00", "2.0"));

        assert_eq!(book.bid_depth(), 1);
        assert_eq!(book.ask_depth(), 1);
        assert_eq!(book.best_bid(), Ok(px("100.50")));
        assert_eq!(book.best_ask(), Ok(px("101.00")));
        assert_eq!(book.order_count(), 2);
        assert!(book.is_consistent());
    }

    #[test]
    fn test_multiple_orders_same_level() {
        let mut book = make_book();
        book.add_order(bid("a", "100.50", "1.0"));
        book.add_order(bid("c", "100.5", "0.5"));

        assert_eq!(book.bid_depth(), 1);
        let level = book.level(Side::Buy, px("100.50")).unwrap();
        assert!(level.contains("a"));
        assert!(level.contains("c"));
        assert_eq!(level.total_size(), qty("1.5"));
    }

    #[test]
    fn test_best_prices_and_mid() {
        let mut book = make_book();
        book.add_order(bid("b1", "49000", "1"));
        book.add_order(bid("b2", "50000", "1"));
        book.add_order(ask("a1", "51000", "1"));
        book.add_order(ask("a2", "52000", "1"));

        assert_eq!(book.best_bid(), Ok(Price::from_u64(50000)));
        assert_eq!(book.best_ask(), Ok(Price::from_u64(51000)));
        assert_eq!(book.spread(), Ok(Decimal::from(1000)));
        assert_eq!(book.mid_price(), Ok(Decimal::from(50500)));
    }

    #[test]
    fn test_mid_price_example() {
        let mut book = make_book();
        book.add_order(bid("a", "100.50", "1.0"));
        book.add_order(ask("b", "101.00", "2.0"));

        assert_eq!(book.mid_price(), Ok(Decimal::from_str_exact("100.75").unwrap()));
    }

    #[test]
    fn test_remove_order_deletes_empty_level() {
        let mut book = make_book();
        book.add_order(bid("a", "50000", "1"));
        book.add_order(bid("b", "49000", "1"));

        let removed = book.remove_order("a").unwrap();
        assert_eq!(removed.order_id.as_str(), "a");
        assert_eq!(book.bid_depth(), 1);
        assert_eq!(book.best_bid(), Ok(Price::from_u64(49000)));
        assert!(book.is_consistent());
    }

    #[test]
    fn test_remove_unknown_order() {
        let mut book = make_book();
        book.add_order(bid("a", "50000", "1"));

        assert_eq!(
            book.remove_order("ghost"),
            Err(BookError::OrderNotFound(OrderId::new("ghost")))
        );
        assert_eq!(book.order_count(), 1);
    }

    #[test]
    fn test_duplicate_id_replaces_across_levels() {
        let mut book = make_book();
        book.add_order(bid("a", "100", "1"));
        let replaced = book.add_order(ask("a", "105", "2"));

        assert_eq!(replaced.map(|o| o.side), Some(Side::Buy));
        assert_eq!(book.bid_depth(), 0);
        assert_eq!(book.ask_depth(), 1);
        assert_eq!(book.order_count(), 1);
        assert!(book.is_consistent());
    }

    #[test]
    fn test_reduce_order_partial_fill() {
        let mut book = make_book();
        book.add_order(ask("m", "51000", "2.0"));

        let remaining = book.reduce_order("m", qty("0.5")).unwrap();
        assert_eq!(remaining, qty("1.5"));
        let level = book.level(Side::Sell, Price::from_u64(51000)).unwrap();
        assert_eq!(level.total_size(), qty("1.5"));
        assert_eq!(book.lookup_order("m").map(|o| o.size), Some(qty("1.5")));
    }

    #[test]
    fn test_reduce_order_full_fill_removes() {
        let mut book = make_book();
        book.add_order(bid("m", "50000", "1.0"));

        let remaining = book.reduce_order("m", qty("3.0")).unwrap();
        assert!(remaining.is_zero());
        assert_eq!(book.bid_depth(), 0);
        assert_eq!(book.order_count(), 0);
    }

    #[test]
    fn test_resize_order_in_place() {
        let mut book = make_book();
        book.add_order(bid("a", "100", "5"));
        book.add_order(bid("b", "100", "1"));

        let old = book.resize_order("a", qty("2")).unwrap();
        assert_eq!(old, qty("5"));
        let level = book.level(Side::Buy, Price::from_u64(100)).unwrap();
        assert_eq!(level.total_size(), qty("3"));
        assert_eq!(level.order_count(), 2);
        assert!(book.is_consistent());
    }

    #[test]
    fn test_resize_unknown_order() {
        let mut book = make_book();
        assert!(matches!(
            book.resize_order("nope", qty("1")),
            Err(BookError::OrderNotFound(_))
        ));
    }

    #[test]
    fn test_load_snapshot_once() {
        let mut book = make_book();
        book.load_snapshot(
            100,
            &[entry("a", "100.50", "1.0")],
            &[entry("b", "101.00", "2.0")],
        )
        .unwrap();

        assert_eq!(book.last_sequence(), 100);
        assert!(book.is_snapshot_loaded());
        assert_eq!(book.lookup_order("a").map(|o| o.side), Some(Side::Buy));
        assert_eq!(book.lookup_order("b").map(|o| o.side), Some(Side::Sell));

        assert_eq!(
            book.load_snapshot(200, &[], &[]),
            Err(BookError::SnapshotAlreadyLoaded { sequence: 100 })
        );
    }

    #[test]
    fn test_depth_ordering_and_restart() {
        let mut book = make_book();
        for i in 1..=5u64 {
            book.add_order(bid(&format!("b{i}"), &(50000 - i * 100).to_string(), "1"));
            book.add_order(ask(&format!("a{i}"), &(51000 + i * 100).to_string(), "1"));
        }

        let bids: Vec<Price> = book.depth(3, Side::Buy).map(PriceLevel::price).collect();
        assert_eq!(
            bids,
            vec![Price::from_u64(49900), Price::from_u64(49800), Price::from_u64(49700)]
        );

        let asks = book.depth(3, Side::Sell);
        let again = asks.clone();
        let first: Vec<Price> = asks.map(PriceLevel::price).collect();
        let second: Vec<Price> = again.map(PriceLevel::price).collect();
        assert_eq!(first, second);
        assert_eq!(first[0], Price::from_u64(51100));

        assert_eq!(book.depth(50, Side::Sell).count(), 5);
        assert_eq!(book.depth(0, Side::Sell).count(), 0);
    }

    #[test]
    fn test_depth_snapshot() {
        let mut book = make_book();
        for i in 1..=5u64 {
            book.add_order(bid(&format!("b{i}"), &(50000 - i * 100).to_string(), "1.0"));
        }
        book.mark_applied(10);

        let snapshot = book.depth_snapshot(3);
        assert_eq!(snapshot.bids.len(), 3);
        assert!(snapshot.asks.is_empty());
        assert!(snapshot.bids[0].price > snapshot.bids[1].price);
        assert_eq!(snapshot.last_sequence, 10);
    }

    #[test]
    fn test_depth_snapshot_serialization() {
        let mut book = make_book();
        book.add_order(bid("a", "50000", "1.0"));

        let snapshot = book.depth_snapshot(10);
        let json = serde_json::to_string(&snapshot).unwrap();
        let deserialized: DepthSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, deserialized);
    }

    #[test]
    fn test_sequence_tracking() {
        let mut book = make_book();
        book.mark_applied(42);
        assert_eq!(book.last_sequence(), 42);
    }
}

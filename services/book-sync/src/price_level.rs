//! Price level: every resting order at one price on one side.
//!
//! Orders are keyed by id; arrival order is irrelevant to a mirror that
//! never matches. The level keeps a running total so depth queries do not
//! walk the orders.

use std::collections::HashMap;

use types::ids::OrderId;
use types::numeric::{Price, Quantity};
use types::order::LimitOrder;

/// All resting orders at a single price on one side of the book.
///
/// Exists in the book only while non-empty; the owning book creates it on
/// first insert and deletes it when the last order leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLevel {
    price: Price,
    orders: HashMap<OrderId, LimitOrder>,
    total_size: Quantity,
}

impl PriceLevel {
    pub fn new(price: Price) -> Self {
        Self {
            price,
            orders: HashMap::new(),
            total_size: Quantity::zero(),
        }
    }

    /// Insert an order keyed by its id.
    ///
    /// Returns the order previously stored under the same id, if any.
    pub fn add(&mut self, order: LimitOrder) -> Option<LimitOrder> {
        self.total_size = self.total_size + order.size;
        let previous = self.orders.insert(order.order_id.clone(), order);
        if let Some(prev) = &previous {
            self.total_size = self.total_size.saturating_sub(prev.size);
        }
        previous
    }

    /// Remove an order. Returns true if the level is now empty.
    pub fn remove(&mut self, order_id: &str) -> bool {
        if let Some(order) = self.orders.remove(order_id) {
            self.total_size = self.total_size.saturating_sub(order.size);
        }
        self.orders.is_empty()
    }

    /// Replace an order's size in place. Returns the old size if present.
    pub fn set_size(&mut self, order_id: &str, size: Quantity) -> Option<Quantity> {
        let order = self.orders.get_mut(order_id)?;
        let old = order.size;
        order.size = size;
        self.total_size = self.total_size.saturating_sub(old) + size;
        Some(old)
    }

    pub fn get(&self, order_id: &str) -> Option<&LimitOrder> {
        self.orders.get(order_id)
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.orders.contains_key(order_id)
    }

    pub fn price(&self) -> Price {
        self.price
    }

    /// Aggregate size of every order at this level.
    pub fn total_size(&self) -> Quantity {
        self.total_size
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Iterate the resting orders (unordered).
    pub fn orders(&self) -> impl Iterator<Item = &LimitOrder> {
        self.orders.values()
    }
}

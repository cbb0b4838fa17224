//! Shared, read-isolated access to the mirrored book
//!
//! One writer (the reconciler) takes the write guard for the duration of a
//! single event; any number of readers take the read guard. Readers never
//! observe a half-applied event.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rust_decimal::Decimal;
use types::ids::MarketId;
use types::numeric::Price;
use types::order::{LimitOrder, Side};

use crate::error::BookError;
use crate::order_book::{DepthSnapshot, LevelSummary, OrderBook};

/// Cloneable handle to the current book.
#[derive(Debug, Clone)]
pub struct BookHandle {
    inner: Arc<RwLock<OrderBook>>,
}

impl BookHandle {
    pub fn new(book: OrderBook) -> Self {
        Self {
            inner: Arc::new(RwLock::new(book)),
        }
    }

    /// Empty book for `symbol`.
    pub fn empty(symbol: MarketId) -> Self {
        Self::new(OrderBook::new(symbol))
    }

    pub fn best_bid(&self) -> Result<Price, BookError> {
        self.inner.read().best_bid()
    }

    pub fn best_ask(&self) -> Result<Price, BookError> {
        self.inner.read().best_ask()
    }

    pub fn mid_price(&self) -> Result<Decimal, BookError> {
        self.inner.read().mid_price()
    }

    pub fn spread(&self) -> Result<Decimal, BookError> {
        self.inner.read().spread()
    }

    /// The `n` best levels on `side`, best first, copied out of the guard.
    pub fn depth(&self, n: usize, side: Side) -> Vec<LevelSummary> {
        self.inner
            .read()
            .depth(n, side)
            .map(LevelSummary::from)
            .collect()
    }

    pub fn depth_snapshot(&self, max_levels: usize) -> DepthSnapshot {
        self.inner.read().depth_snapshot(max_levels)
    }

    pub fn lookup_order(&self, order_id: &str) -> Option<LimitOrder> {
        self.inner.read().lookup_order(order_id).cloned()
    }

    pub fn last_sequence(&self) -> u64 {
        self.inner.read().last_sequence()
    }

    pub fn order_count(&self) -> usize {
        self.inner.read().order_count()
    }

    /// Run `f` against a consistent view of the whole book.
    pub fn with_book<R>(&self, f: impl FnOnce(&OrderBook) -> R) -> R {
        f(&self.inner.read())
    }

    /// Hold the read guard directly.
    pub fn read(&self) -> RwLockReadGuard<'_, OrderBook> {
        self.inner.read()
    }

    /// Writer access. Only the reconciler should call this.
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, OrderBook> {
        self.inner.write()
    }

    /// Swap in a fresh book, returning the discarded one.
    pub(crate) fn replace(&self, book: OrderBook) -> OrderBook {
        std::mem::replace(&mut *self.inner.write(), book)
    }
}

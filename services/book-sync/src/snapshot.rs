//! Diagnostic book snapshots
//!
//! Checksummed, versioned summaries of the mirrored book, used to compare two
//! mirrors (or a mirror and a fresh venue snapshot) for divergence, plus
//! pagination for deep books and a full order-level export.
//!
//! The checksum covers every resting order, not just level totals, so two
//! books with equal depth but different order sets disagree.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use types::ids::MarketId;
use types::order::{LimitOrder, Side};

use crate::events::{BookSnapshot, SnapshotEntry};
use crate::order_book::{LevelSummary, OrderBook};

/// Versioned, checksummed summary of the whole book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDigest {
    /// Monotonic digest version from the builder.
    pub version: u64,
    pub symbol: MarketId,
    /// Bid levels in descending price order (best first).
    pub bids: Vec<LevelSummary>,
    /// Ask levels in ascending price order (best first).
    pub asks: Vec<LevelSummary>,
    pub order_count: usize,
    /// Last applied sequence.
    pub last_sequence: u64,
    /// Unix nanos when the digest was taken.
    pub timestamp: i64,
    /// SHA-256 over every resting order and the sequence.
    pub checksum: String,
}

/// One page of levels for deep books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedDepth {
    pub symbol: MarketId,
    pub bids: Vec<LevelSummary>,
    pub asks: Vec<LevelSummary>,
    pub last_sequence: u64,
    pub page: usize,
    pub page_size: usize,
    pub total_bid_levels: usize,
    pub total_ask_levels: usize,
    pub has_more: bool,
}

/// Builds versioned digests.
pub struct DigestBuilder {
    version_counter: u64,
}

impl DigestBuilder {
    pub fn new() -> Self {
        Self { version_counter: 0 }
    }

    pub fn build(&mut self, book: &OrderBook, timestamp: i64) -> BookDigest {
        self.version_counter += 1;

        BookDigest {
            version: self.version_counter,
            symbol: book.symbol.clone(),
            bids: book.bid_levels(),
            asks: book.ask_levels(),
            order_count: book.order_count(),
            last_sequence: book.last_sequence(),
            timestamp,
            checksum: book_checksum(book),
        }
    }
}

impl Default for DigestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Page `page` (zero-based) of `page_size` levels per side.
pub fn paginate(book: &OrderBook, page: usize, page_size: usize) -> PaginatedDepth {
    let offset = page.saturating_mul(page_size);
    let take = |side: Side| -> Vec<LevelSummary> {
        book.depth(usize::MAX, side)
            .skip(offset)
            .take(page_size)
            .map(LevelSummary::from)
            .collect()
    };

    let total_bid_levels = book.bid_depth();
    let total_ask_levels = book.ask_depth();
    let max_total = total_bid_levels.max(total_ask_levels);

    PaginatedDepth {
        symbol: book.symbol.clone(),
        bids: take(Side::Buy),
        asks: take(Side::Sell),
        last_sequence: book.last_sequence(),
        page,
        page_size,
        total_bid_levels,
        total_ask_levels,
        has_more: offset.saturating_add(page_size) < max_total,
    }
}

/// SHA-256 over every resting order, level by level, best first.
///
/// Orders inside a level are hashed in id order so the result does not
/// depend on insertion history.
pub fn book_checksum(book: &OrderBook) -> String {
    let mut hasher = Sha256::new();

    for side in [Side::Buy, Side::Sell] {
        for level in book.depth(usize::MAX, side) {
            hasher.update(canonical(level.price().as_decimal()).as_bytes());
            hasher.update(b":");
            hasher.update(canonical(level.total_size().as_decimal()).as_bytes());
            hasher.update(b"[");
            for order in sorted_orders(level.orders()) {
                hasher.update(order.order_id.as_str().as_bytes());
                hasher.update(b"=");
                hasher.update(canonical(order.size.as_decimal()).as_bytes());
                hasher.update(b",");
            }
            hasher.update(b"]|");
        }
        hasher.update(b"---");
    }

    hasher.update(book.last_sequence().to_le_bytes());

    format!("{:x}", hasher.finalize())
}

/// Scale-free text, so `100.5` and `100.50` hash alike.
fn canonical(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Whether two books hold different orders or sequences.
pub fn diverged(a: &OrderBook, b: &OrderBook) -> bool {
    book_checksum(a) != book_checksum(b)
}

/// Export the book in the venue's level-3 snapshot shape, best price first
/// and ids sorted within a level.
pub fn export_snapshot(book: &OrderBook) -> BookSnapshot {
    let side_entries = |side: Side| -> Vec<SnapshotEntry> {
        book.depth(usize::MAX, side)
            .flat_map(|level| sorted_orders(level.orders()))
            .map(|order| SnapshotEntry {
                order_id: order.order_id.clone(),
                price: order.price,
                size: order.size,
            })
            .collect()
    };

    BookSnapshot {
        sequence: book.last_sequence(),
        bids: side_entries(Side::Buy),
        asks: side_entries(Side::Sell),
    }
}

fn sorted_orders<'a>(orders: impl Iterator<Item = &'a LimitOrder>) -> Vec<&'a LimitOrder> {
    let mut orders: Vec<&LimitOrder> = orders.collect();
    orders.sort_by(|a, b| a.order_id.cmp(&b.order_id));
    orders
}

//! Offline replay of a recorded session
//!
//! Feeds a recorded level-3 snapshot and a JSON-lines feed capture through
//! the same `Reconciler` the live service uses, then reports counts and a
//! book checksum.
//!
//! Deterministic: the same inputs always produce the same book and checksum.

use std::io::BufRead;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use types::ids::MarketId;

use crate::error::SyncError;
use crate::events::{BookEvent, BookSnapshot};
use crate::feed::{self, MalformedEventError};
use crate::metrics::SyncMetrics;
use crate::notify::TradeObservation;
use crate::order_book::OrderBook;
use crate::pending::OverflowPolicy;
use crate::reconciler::{EventOutcome, Reconciler};
use crate::sequence::{GapPolicy, GapReport};
use crate::snapshot::book_checksum;

/// Counts collected during replay.
#[derive(Debug, Clone)]
pub struct ReplayMetrics {
    /// Feed lines read, including malformed ones.
    pub events_read: u64,
    pub events_applied: u64,
    pub events_stale: u64,
    pub malformed_events: u64,
    pub gaps_detected: u64,
    pub orders_not_found: u64,
    pub duration_ms: u128,
    pub events_per_second: f64,
    /// Book checksum after the last event.
    pub state_checksum: String,
}

/// Result of a replay run.
#[derive(Debug)]
pub struct ReplayResult {
    /// Final book.
    pub book: OrderBook,
    /// Every trade seen, in feed order.
    pub trades: Vec<TradeObservation>,
    pub metrics: ReplayMetrics,
}

/// Errors during replay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    #[error("unreadable snapshot: {0}")]
    Snapshot(MalformedEventError),

    #[error("failed to read feed: {0}")]
    Io(String),

    #[error("replay aborted: {0}")]
    Sync(#[from] SyncError),

    #[error("sequence gap {0:?} under force_resync; no fresh snapshot available offline")]
    ResyncRequired(GapReport),

    #[error("state checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// Replays a recorded snapshot and feed.
pub struct ReplayEngine {
    symbol: MarketId,
    gap_policy: GapPolicy,
    /// Feed events delivered before the snapshot is loaded.
    snapshot_after: usize,
    expected_checksum: Option<String>,
}

impl ReplayEngine {
    pub fn new(symbol: MarketId) -> Self {
        Self {
            symbol,
            gap_policy: GapPolicy::ApplyAndContinue,
            snapshot_after: 0,
            expected_checksum: None,
        }
    }

    pub fn with_gap_policy(mut self, policy: GapPolicy) -> Self {
        self.gap_policy = policy;
        self
    }

    /// Deliver the first `n` feed events before loading the snapshot, the
    /// way a live session sees them while the REST call is in flight.
    pub fn with_snapshot_after(mut self, n: usize) -> Self {
        self.snapshot_after = n;
        self
    }

    /// Set the expected state checksum for post-replay validation.
    pub fn with_expected_checksum(mut self, checksum: String) -> Self {
        self.expected_checksum = Some(checksum);
        self
    }

    /// Replay a snapshot body and a JSON-lines feed capture.
    ///
    /// Blank lines are skipped; malformed lines are counted and skipped.
    pub fn replay_lines(
        &self,
        snapshot_json: &str,
        feed_lines: impl BufRead,
    ) -> Result<ReplayResult, ReplayError> {
        let snapshot = feed::parse_snapshot(snapshot_json).map_err(ReplayError::Snapshot)?;

        let mut events = Vec::new();
        for line in feed_lines.lines() {
            let line = line.map_err(|e| ReplayError::Io(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(feed::parse_event(&line));
        }

        self.replay(snapshot, events)
    }

    /// Replay already-parsed input.
    pub fn replay(
        &self,
        snapshot: BookSnapshot,
        events: impl IntoIterator<Item = Result<BookEvent, MalformedEventError>>,
    ) -> Result<ReplayResult, ReplayError> {
        let start = Instant::now();
        let metrics = Arc::new(SyncMetrics::new());
        let mut reconciler = Reconciler::new(
            self.symbol.clone(),
            self.gap_policy,
            self.snapshot_after.max(1),
            OverflowPolicy::Block,
            metrics.clone(),
        );

        info!(
            symbol = %self.symbol,
            snapshot_sequence = snapshot.sequence,
            snapshot_orders = snapshot.order_count(),
            "Starting replay"
        );

        let mut trades = Vec::new();
        let mut events_read: u64 = 0;
        let mut snapshot = Some(snapshot);

        for item in events {
            if events_read as usize == self.snapshot_after {
                self.load(&mut reconciler, &mut snapshot, &mut trades)?;
            }
            events_read += 1;

            let event = match item {
                Ok(event) => event,
                Err(err) => {
                    metrics.record_malformed();
                    warn!(sequence = ?err.sequence(), error = %err, "Skipping malformed event");
                    continue;
                }
            };

            match reconciler.on_event(event)? {
                EventOutcome::ResyncRequired(gap) => return Err(ReplayError::ResyncRequired(gap)),
                EventOutcome::Applied {
                    trade: Some(trade), ..
                } => trades.push(trade),
                _ => {}
            }
        }
        // Short feeds never reach the snapshot point.
        self.load(&mut reconciler, &mut snapshot, &mut trades)?;

        let book = reconciler.book().read().clone();
        let state_checksum = book_checksum(&book);

        if let Some(expected) = &self.expected_checksum {
            if &state_checksum != expected {
                error!(
                    expected = %expected,
                    actual = %state_checksum,
                    "State checksum mismatch after replay"
                );
                return Err(ReplayError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual: state_checksum,
                });
            }
        }

        let duration_ms = start.elapsed().as_millis();
        let events_per_second = if duration_ms > 0 {
            (events_read as f64 / duration_ms as f64) * 1000.0
        } else {
            events_read as f64
        };
        let counters = metrics.export();

        let metrics = ReplayMetrics {
            events_read,
            events_applied: counters["events_applied"],
            events_stale: counters["events_stale"],
            malformed_events: counters["malformed_events"],
            gaps_detected: counters["gaps_detected"],
            orders_not_found: counters["orders_not_found"],
            duration_ms,
            events_per_second,
            state_checksum,
        };

        info!(
            events_read = metrics.events_read,
            applied = metrics.events_applied,
            gaps = metrics.gaps_detected,
            duration_ms = metrics.duration_ms,
            eps = %format!("{:.0}", metrics.events_per_second),
            "Replay completed"
        );

        Ok(ReplayResult {
            book,
            trades,
            metrics,
        })
    }

    fn load(
        &self,
        reconciler: &mut Reconciler,
        snapshot: &mut Option<BookSnapshot>,
        trades: &mut Vec<TradeObservation>,
    ) -> Result<(), ReplayError> {
        let Some(snapshot) = snapshot.take() else {
            return Ok(());
        };
        let summary = reconciler.on_snapshot(snapshot)?;
        trades.extend(summary.trades);
        match summary.resync {
            Some(gap) => Err(ReplayError::ResyncRequired(gap)),
            None => Ok(()),
        }
    }
}

//! Snapshot/stream reconciliation
//!
//! The reconciler is the single writer of the mirrored book. It runs a small
//! state machine:
//!
//! ```text
//! AwaitingSnapshot --snapshot--> Syncing --buffer drained--> Live
//!        ^                                                     |
//!        +---------------- forced resync ----------------------+
//! ```
//!
//! While awaiting the snapshot every event is buffered, never applied. Once
//! the snapshot is loaded the buffer is drained in arrival order through the
//! sequence gate, then each new event goes straight through the gate.
//!
//! This type is synchronous and does no I/O; `service` drives it from async
//! sources.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use types::ids::{MarketId, OrderId};
use types::numeric::Quantity;

use crate::config::SyncConfig;
use crate::error::{BookError, SyncError};
use crate::events::{BookEvent, BookSnapshot, EventPayload};
use crate::feed;
use crate::handle::BookHandle;
use crate::metrics::SyncMetrics;
use crate::notify::TradeObservation;
use crate::order_book::OrderBook;
use crate::pending::{OverflowPolicy, PendingBuffer};
use crate::sequence::{Admission, GapPolicy, GapReport, SequenceGate};

/// Reconciler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    AwaitingSnapshot,
    Syncing,
    Live,
}

/// What applying one event did to the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Nothing to change (open, non-resting received, unknown type).
    None,
    /// A limit order now rests on the book.
    Added { replaced: bool },
    /// An order left the book.
    Removed,
    /// A maker was filled down to `remaining` (zero means removed).
    Filled { remaining: Quantity },
    /// An order's size was amended from `old`.
    Resized { old: Quantity },
    /// The event referenced an order the book does not hold.
    NotFound(OrderId),
}

/// Result of offering one event to the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Held until the snapshot arrives. Carries the sequence evicted to make
    /// room, if any.
    Buffered { evicted: Option<u64> },
    /// Already reflected in the book.
    Stale,
    /// Applied to the book.
    Applied {
        effect: Effect,
        gap: Option<GapReport>,
        trade: Option<TradeObservation>,
    },
    /// Not applied; the book was discarded and a new snapshot is needed.
    ResyncRequired(GapReport),
}

impl EventOutcome {
    pub fn trade(&self) -> Option<&TradeObservation> {
        match self {
            EventOutcome::Applied { trade, .. } => trade.as_ref(),
            _ => None,
        }
    }
}

/// Result of loading a snapshot and draining the buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub snapshot_sequence: u64,
    pub snapshot_orders: usize,
    /// Buffered events replayed after the load.
    pub drained: usize,
    pub applied: usize,
    pub stale: usize,
    /// Trades seen among the drained events.
    pub trades: Vec<TradeObservation>,
    /// Set when draining hit a gap under `GapPolicy::ForceResync`.
    pub resync: Option<GapReport>,
}

/// Single writer that merges a snapshot with the live diff stream.
#[derive(Debug)]
pub struct Reconciler {
    symbol: MarketId,
    state: SyncState,
    book: BookHandle,
    gate: SequenceGate,
    pending: PendingBuffer,
    metrics: Arc<SyncMetrics>,
}

impl Reconciler {
    pub fn new(
        symbol: MarketId,
        gap_policy: GapPolicy,
        pending_capacity: usize,
        overflow_policy: OverflowPolicy,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        info!(
            symbol = %symbol,
            ?gap_policy,
            pending_capacity,
            ?overflow_policy,
            "Reconciler initialized"
        );

        Self {
            book: BookHandle::empty(symbol.clone()),
            symbol,
            state: SyncState::AwaitingSnapshot,
            gate: SequenceGate::new(gap_policy),
            pending: PendingBuffer::new(pending_capacity, overflow_policy),
            metrics,
        }
    }

    pub fn from_config(config: &SyncConfig, metrics: Arc<SyncMetrics>) -> Self {
        Self::new(
            config.symbol.clone(),
            config.gap_policy,
            config.pending_capacity,
            config.overflow_policy,
            metrics,
        )
    }

    /// Reconciler with default settings and private counters.
    pub fn with_defaults(symbol: MarketId) -> Self {
        Self::new(
            symbol,
            GapPolicy::default(),
            SyncConfig::default().pending_capacity,
            OverflowPolicy::default(),
            Arc::new(SyncMetrics::new()),
        )
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn symbol(&self) -> &MarketId {
        &self.symbol
    }

    /// Read handle onto the book. Stays valid across resyncs.
    pub fn book(&self) -> BookHandle {
        self.book.clone()
    }

    pub fn gate(&self) -> &SequenceGate {
        &self.gate
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    /// Number of events waiting for the snapshot.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether `on_event` can take another event without overflowing.
    pub fn can_accept(&self) -> bool {
        self.state == SyncState::Live
            || self.pending.policy() == OverflowPolicy::DropOldest
            || !self.pending.is_full()
    }

    /// Parse a raw feed message and offer it.
    pub fn on_raw(&mut self, json: &str) -> Result<EventOutcome, SyncError> {
        match feed::parse_event(json) {
            Ok(event) => self.on_event(event),
            Err(err) => {
                self.metrics.record_malformed();
                warn!(sequence = ?err.sequence(), error = %err, "Skipping malformed event");
                Err(err.into())
            }
        }
    }

    /// Offer one event from the live stream.
    ///
    /// Buffered before the snapshot, passed through the gate after it. Only
    /// a full buffer under `OverflowPolicy::Block` is an error.
    pub fn on_event(&mut self, event: BookEvent) -> Result<EventOutcome, SyncError> {
        match self.state {
            SyncState::AwaitingSnapshot | SyncState::Syncing => self.buffer(event),
            SyncState::Live => {
                let outcome = self.process(&event);
                if let EventOutcome::ResyncRequired(_) = outcome {
                    self.reset([event])?;
                }
                Ok(outcome)
            }
        }
    }

    /// Load a fetched snapshot and replay everything buffered behind it.
    ///
    /// Only valid while awaiting a snapshot.
    pub fn on_snapshot(&mut self, snapshot: BookSnapshot) -> Result<SyncSummary, SyncError> {
        if self.state != SyncState::AwaitingSnapshot {
            return Err(BookError::SnapshotAlreadyLoaded {
                sequence: self.book.last_sequence(),
            }
            .into());
        }

        self.state = SyncState::Syncing;
        if let Err(err) = self
            .book
            .write()
            .load_snapshot(snapshot.sequence, &snapshot.bids, &snapshot.asks)
        {
            self.state = SyncState::AwaitingSnapshot;
            return Err(err.into());
        }
        self.metrics.record_snapshot_loaded();

        let mut summary = SyncSummary {
            snapshot_sequence: snapshot.sequence,
            snapshot_orders: snapshot.order_count(),
            ..SyncSummary::default()
        };
        info!(
            sequence = snapshot.sequence,
            orders = summary.snapshot_orders,
            buffered = self.pending.len(),
            "Snapshot loaded, draining buffer"
        );

        let mut drained = self.pending.drain().into_iter();
        while let Some(event) = drained.next() {
            summary.drained += 1;
            match self.process(&event) {
                EventOutcome::Stale => summary.stale += 1,
                EventOutcome::Applied { trade, .. } => {
                    summary.applied += 1;
                    summary.trades.extend(trade);
                }
                EventOutcome::ResyncRequired(gap) => {
                    summary.resync = Some(gap);
                    self.reset(std::iter::once(event).chain(drained))?;
                    return Ok(summary);
                }
                EventOutcome::Buffered { .. } => {}
            }
        }

        self.state = SyncState::Live;
        info!(
            last_sequence = self.book.last_sequence(),
            applied = summary.applied,
            stale = summary.stale,
            bid_levels = self.book.read().bid_depth(),
            ask_levels = self.book.read().ask_depth(),
            "Book live"
        );
        Ok(summary)
    }

    /// Discard the book and wait for a new snapshot.
    ///
    /// Events already buffered are kept for the next snapshot.
    pub fn force_resync(&mut self) {
        info!(state = ?self.state, "Forced resync requested");
        // Nothing carried, so the buffer cannot overflow.
        let _ = self.reset(std::iter::empty());
    }

    fn buffer(&mut self, event: BookEvent) -> Result<EventOutcome, SyncError> {
        let sequence = event.sequence;
        let evicted = self.pending.push(event)?.map(|e| e.sequence);
        if evicted.is_some() {
            self.metrics.record_pending_dropped();
        }
        self.metrics.record_buffered();
        debug!(sequence, buffered = self.pending.len(), "Buffered event awaiting snapshot");
        Ok(EventOutcome::Buffered { evicted })
    }

    fn reset(&mut self, carry: impl IntoIterator<Item = BookEvent>) -> Result<(), SyncError> {
        let discarded = self.book.replace(OrderBook::new(self.symbol.clone()));
        self.state = SyncState::AwaitingSnapshot;
        self.metrics.record_resync();

        for event in carry {
            self.buffer(event)?;
        }

        info!(
            discarded_orders = discarded.order_count(),
            discarded_sequence = discarded.last_sequence(),
            buffered = self.pending.len(),
            "Book discarded, awaiting snapshot"
        );
        Ok(())
    }

    /// Gate one event and apply it if admitted.
    fn process(&mut self, event: &BookEvent) -> EventOutcome {
        let admission = self.gate.admit(self.book.last_sequence(), event.sequence);

        let gap = match admission {
            Admission::Drop => {
                self.metrics.record_stale();
                return EventOutcome::Stale;
            }
            Admission::Resync(gap) => {
                self.metrics.record_gap();
                return EventOutcome::ResyncRequired(gap);
            }
            Admission::Apply => None,
            Admission::ApplyAfterGap(gap) => {
                self.metrics.record_gap();
                Some(gap)
            }
        };

        let started = Instant::now();
        let (effect, trade) = {
            let mut book = self.book.write();
            let applied = apply(&mut book, event);
            book.mark_applied(event.sequence);
            applied
        };
        self.metrics
            .record_applied(started.elapsed().as_nanos().min(u64::MAX as u128) as u64);

        match &effect {
            Effect::NotFound(order_id) => {
                self.metrics.record_order_not_found();
                debug!(
                    sequence = event.sequence,
                    event_type = event.event_type_label(),
                    order_id = %order_id,
                    "Order not found"
                );
            }
            Effect::None => {
                if let EventPayload::Unknown { kind } = &event.payload {
                    self.metrics.record_unknown();
                    debug!(sequence = event.sequence, kind = %kind, "Ignoring unknown event type");
                }
            }
            _ => {}
        }

        EventOutcome::Applied { effect, gap, trade }
    }
}

/// Apply an admitted event's payload to the book.
fn apply(book: &mut OrderBook, event: &BookEvent) -> (Effect, Option<TradeObservation>) {
    match &event.payload {
        EventPayload::Open { .. }
        | EventPayload::FundsChange { .. }
        | EventPayload::Unknown { .. } => (Effect::None, None),

        EventPayload::Received { .. } => match event.resting_order() {
            Some(order) => {
                let replaced = book.add_order(order).is_some();
                if replaced {
                    debug!(sequence = event.sequence, "Received order replaced an existing id");
                }
                (Effect::Added { replaced }, None)
            }
            None => (Effect::None, None),
        },

        EventPayload::Done { order_id, .. } => match book.remove_order(order_id.as_str()) {
            Ok(_) => (Effect::Removed, None),
            Err(_) => (Effect::NotFound(order_id.clone()), None),
        },

        EventPayload::Match {
            trade_id,
            maker_order_id,
            side,
            price,
            size,
            ..
        } => {
            let trade = TradeObservation {
                sequence: event.sequence,
                trade_id: *trade_id,
                price: *price,
                size: *size,
                side: *side,
                time: event.timestamp,
                maker_order_id: maker_order_id.clone(),
            };
            let effect = match book.reduce_order(maker_order_id.as_str(), *size) {
                Ok(remaining) => Effect::Filled { remaining },
                Err(_) => Effect::NotFound(maker_order_id.clone()),
            };
            (effect, Some(trade))
        }

        EventPayload::Change {
            order_id, new_size, ..
        } => match book.resize_order(order_id.as_str(), *new_size) {
            Ok(old) => (Effect::Resized { old }, None),
            Err(_) => (Effect::NotFound(order_id.clone()), None),
        },
    }
}

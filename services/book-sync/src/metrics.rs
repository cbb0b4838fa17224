//! Counters for the book mirror
//!
//! Lock-free counters shared between the writer task and whoever reports
//! them. Apply latency is sampled into a bounded window for percentiles.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Running counters for one mirrored book.
pub struct SyncMetrics {
    // Event flow
    pub events_applied: AtomicU64,
    pub events_stale: AtomicU64,
    pub events_buffered: AtomicU64,
    pub events_unknown: AtomicU64,
    pub malformed_events: AtomicU64,
    pub orders_not_found: AtomicU64,
    pub gaps_detected: AtomicU64,
    pub apply_latency_ns: Mutex<LatencyTracker>,

    // Pre-snapshot buffer
    pub pending_dropped: AtomicU64,

    // Snapshot lifecycle
    pub snapshots_loaded: AtomicU64,
    pub snapshot_fetch_failures: AtomicU64,
    pub resyncs: AtomicU64,

    // Trade fan-out
    pub trades_published: AtomicU64,
    pub trades_dropped: AtomicU64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            events_applied: AtomicU64::new(0),
            events_stale: AtomicU64::new(0),
            events_buffered: AtomicU64::new(0),
            events_unknown: AtomicU64::new(0),
            malformed_events: AtomicU64::new(0),
            orders_not_found: AtomicU64::new(0),
            gaps_detected: AtomicU64::new(0),
            apply_latency_ns: Mutex::new(LatencyTracker::new(1000)),
            pending_dropped: AtomicU64::new(0),
            snapshots_loaded: AtomicU64::new(0),
            snapshot_fetch_failures: AtomicU64::new(0),
            resyncs: AtomicU64::new(0),
            trades_published: AtomicU64::new(0),
            trades_dropped: AtomicU64::new(0),
        }
    }

    /// Record an event applied to the book.
    pub fn record_applied(&self, latency_ns: u64) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
        self.apply_latency_ns.lock().record(latency_ns);
    }

    pub fn record_stale(&self) {
        self.events_stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_buffered(&self) {
        self.events_buffered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown(&self) {
        self.events_unknown.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_order_not_found(&self) {
        self.orders_not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gap(&self) {
        self.gaps_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pending_dropped(&self) {
        self.pending_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_loaded(&self) {
        self.snapshots_loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_failure(&self) {
        self.snapshot_fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trade_published(&self) {
        self.trades_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trade_dropped(&self) {
        self.trades_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// p99 apply latency over the sample window.
    pub fn apply_latency_p99(&self) -> Option<u64> {
        self.apply_latency_ns.lock().percentile(99)
    }

    /// Export counters keyed by name, in stable order.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let counters = [
            ("events_applied", &self.events_applied),
            ("events_stale", &self.events_stale),
            ("events_buffered", &self.events_buffered),
            ("events_unknown", &self.events_unknown),
            ("malformed_events", &self.malformed_events),
            ("orders_not_found", &self.orders_not_found),
            ("gaps_detected", &self.gaps_detected),
            ("pending_dropped", &self.pending_dropped),
            ("snapshots_loaded", &self.snapshots_loaded),
            ("snapshot_fetch_failures", &self.snapshot_fetch_failures),
            ("resyncs", &self.resyncs),
            ("trades_published", &self.trades_published),
            ("trades_dropped", &self.trades_dropped),
        ];
        counters
            .into_iter()
            .map(|(name, counter)| (name.to_string(), counter.load(Ordering::Relaxed)))
            .collect()
    }
}

impl std::fmt::Debug for SyncMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.export()).finish()
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks latency samples for percentile calculation.
pub struct LatencyTracker {
    samples: Vec<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a latency sample.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.remove(0);
        }
        self.samples.push(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted = self.samples.clone();
        sorted.sort_unstable();

        let idx = p.min(100) * (sorted.len() - 1) / 100;
        sorted.get(idx).copied()
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

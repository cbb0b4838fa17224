//! Sequence gate
//!
//! Classifies each incoming event against the book's last applied sequence
//! and decides, under the configured `GapPolicy`, whether it is applied.
//!
//! - `seq <= last`     stale, dropped silently
//! - `seq == last + 1` next, applied
//! - `seq >  last + 1` gap, reported once, then applied or resynced

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SyncError;

/// Where an event's sequence falls relative to the last applied one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Stale,
    Next,
    Gap { expected: u64, got: u64 },
}

/// Pure classification of `sequence` against `last_applied`.
pub fn classify(last_applied: u64, sequence: u64) -> Classification {
    if sequence <= last_applied {
        Classification::Stale
    } else if sequence == last_applied + 1 {
        Classification::Next
    } else {
        Classification::Gap {
            expected: last_applied + 1,
            got: sequence,
        }
    }
}

/// What to do when a gap is seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Warn, apply the event anyway and advance past the gap.
    #[default]
    ApplyAndContinue,
    /// Stop applying and rebuild the book from a fresh snapshot.
    ForceResync,
}

impl std::str::FromStr for GapPolicy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apply_and_continue" => Ok(GapPolicy::ApplyAndContinue),
            "force_resync" => Ok(GapPolicy::ForceResync),
            other => Err(SyncError::Config(format!("unknown gap policy: {other}"))),
        }
    }
}

/// A detected run of missing sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapReport {
    /// First sequence that was expected.
    pub expected: u64,
    /// Sequence that actually arrived.
    pub got: u64,
}

impl GapReport {
    /// Number of events missed.
    pub fn missing(&self) -> u64 {
        self.got - self.expected
    }
}

impl From<GapReport> for SyncError {
    fn from(gap: GapReport) -> Self {
        SyncError::SequenceGapDetected {
            expected: gap.expected,
            got: gap.got,
        }
    }
}

/// The gate's verdict for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Already reflected in the book.
    Drop,
    /// Apply and advance.
    Apply,
    /// Apply and advance past a reported gap.
    ApplyAfterGap(GapReport),
    /// Do not apply; the book must be rebuilt.
    Resync(GapReport),
}

/// Applies `GapPolicy` to each classification and keeps running counts.
#[derive(Debug, Clone, Default)]
pub struct SequenceGate {
    policy: GapPolicy,
    admitted: u64,
    stale_dropped: u64,
    gaps_detected: u64,
    last_gap: Option<GapReport>,
}

impl SequenceGate {
    pub fn new(policy: GapPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> GapPolicy {
        self.policy
    }

    /// Decide whether the event at `sequence` is applied on top of
    /// `last_applied`. Every gap is counted and logged exactly once here.
    pub fn admit(&mut self, last_applied: u64, sequence: u64) -> Admission {
        match classify(last_applied, sequence) {
            Classification::Stale => {
                self.stale_dropped += 1;
                debug!(sequence, last_applied, "Dropping stale event");
                Admission::Drop
            }
            Classification::Next => {
                self.admitted += 1;
                Admission::Apply
            }
            Classification::Gap { expected, got } => {
                let gap = GapReport { expected, got };
                self.gaps_detected += 1;
                self.last_gap = Some(gap);
                warn!(
                    expected,
                    got,
                    missing = gap.missing(),
                    policy = ?self.policy,
                    "Sequence gap detected"
                );
                match self.policy {
                    GapPolicy::ApplyAndContinue => {
                        self.admitted += 1;
                        Admission::ApplyAfterGap(gap)
                    }
                    GapPolicy::ForceResync => Admission::Resync(gap),
                }
            }
        }
    }

    /// Events admitted for application since creation.
    pub fn admitted(&self) -> u64 {
        self.admitted
    }

    /// Stale events dropped since creation.
    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }

    /// Gaps detected since creation.
    pub fn gaps_detected(&self) -> u64 {
        self.gaps_detected
    }

    /// Most recent gap, if any was ever seen.
    pub fn last_gap(&self) -> Option<GapReport> {
        self.last_gap
    }
}

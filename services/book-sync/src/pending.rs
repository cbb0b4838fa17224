//! Bounded pre-snapshot buffer
//!
//! Holds live events that arrive before the snapshot is loaded, in arrival
//! order. Capacity is fixed; what happens on overflow is an explicit
//! `OverflowPolicy`.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SyncError;
use crate::events::BookEvent;

/// Behaviour when the buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Refuse the event; the producer must wait until the buffer drains.
    #[default]
    Block,
    /// Evict the oldest buffered event to make room.
    DropOldest,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block" => Ok(OverflowPolicy::Block),
            "drop_oldest" => Ok(OverflowPolicy::DropOldest),
            other => Err(SyncError::Config(format!("unknown overflow policy: {other}"))),
        }
    }
}

/// Events waiting for the snapshot.
#[derive(Debug)]
pub struct PendingBuffer {
    events: VecDeque<BookEvent>,
    capacity: usize,
    policy: OverflowPolicy,
    /// Total events evicted under `DropOldest`.
    dropped: u64,
}

impl PendingBuffer {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            events: VecDeque::new(),
            capacity,
            policy,
            dropped: 0,
        }
    }

    /// Append an event.
    ///
    /// Under `Block` a full buffer rejects the event with `BufferOverflow`
    /// and leaves the buffer unchanged. Under `DropOldest` the front event is
    /// evicted and returned.
    pub fn push(&mut self, event: BookEvent) -> Result<Option<BookEvent>, SyncError> {
        let mut evicted = None;

        if self.events.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::Block => {
                    return Err(SyncError::BufferOverflow {
                        capacity: self.capacity,
                    });
                }
                OverflowPolicy::DropOldest => {
                    evicted = self.events.pop_front();
                    self.dropped += 1;
                    warn!(
                        capacity = self.capacity,
                        evicted_sequence = evicted.as_ref().map(|e| e.sequence),
                        incoming_sequence = event.sequence,
                        total_dropped = self.dropped,
                        "Pending buffer full, dropping oldest event"
                    );
                }
            }
        }

        self.events.push_back(event);
        Ok(evicted)
    }

    /// Take every buffered event in arrival order.
    pub fn drain(&mut self) -> Vec<BookEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether another push would overflow.
    pub fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Total events evicted since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

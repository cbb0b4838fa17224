//! Error taxonomy for book reconstruction
//!
//! Nothing here is fatal to the process. Callers log and continue; the only
//! error that stops the service loop is an abandoned snapshot fetch.

use thiserror::Error;
use types::ids::OrderId;
use types::order::Side;

use crate::feed::MalformedEventError;

/// Errors raised by order book operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookError {
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Empty book: no {0} levels")]
    EmptyBook(Side),

    #[error("Snapshot already loaded at sequence {sequence}")]
    SnapshotAlreadyLoaded { sequence: u64 },
}

/// Errors raised by the reconciler and the service loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("sequence gap detected: expected {expected}, got {got}")]
    SequenceGapDetected { expected: u64, got: u64 },

    #[error("Book error: {0}")]
    Book(#[from] BookError),

    #[error("Malformed event: {0}")]
    Malformed(#[from] MalformedEventError),

    #[error("snapshot fetch failed: {0}")]
    SnapshotFetchFailure(String),

    #[error("snapshot fetch abandoned after {attempts} attempts")]
    SnapshotAbandoned { attempts: u32 },

    #[error("pending buffer full: capacity {capacity}")]
    BufferOverflow { capacity: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

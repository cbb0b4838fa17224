//! Book Sync Service
//!
//! Maintains a local mirror of one product's level-3 limit order book by
//! merging a REST snapshot with the venue's incremental full-channel feed:
//! - Snapshot/stream reconciliation with arrival-order buffering
//! - Sequence gating (stale drop, gap detection, optional forced resync)
//! - Price-level aggregation with a per-order index and cached totals
//! - Read-isolated queries (top of book, depth, order lookup)
//! - Trade notifications from match events
//! - Checksummed digests and offline replay of recorded sessions
//!
//! # Architecture
//!
//! ```text
//!   Feed (JSON)          REST snapshot
//!        │                     │
//!    ┌───▼───┐          ┌──────▼──────┐
//!    │ feed  │          │SnapshotSource│ ← retried with backoff
//!    └───┬───┘          └──────┬──────┘
//!        │                     │
//!    ┌───▼─────────────────────▼───┐
//!    │        Reconciler           │ ← pending buffer + sequence gate
//!    └───┬──────────────────┬──────┘
//!        │                  │
//!    ┌───▼──────┐     ┌─────▼─────┐
//!    │BookHandle│     │  Trades   │
//!    │ (RwLock) │     │  (mpsc)   │
//!    └───┬──────┘     └───────────┘
//!        │
//!   readers: queries, digests
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod handle;
pub mod metrics;
pub mod notify;
pub mod order_book;
pub mod pending;
pub mod price_level;
pub mod reconciler;
pub mod replay;
pub mod sequence;
pub mod service;
pub mod snapshot;
pub mod telemetry;

pub use config::SyncConfig;
pub use error::{BookError, SyncError};
pub use handle::BookHandle;
pub use reconciler::{Reconciler, SyncState};
pub use service::{BookSyncService, Command, SnapshotSource};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";

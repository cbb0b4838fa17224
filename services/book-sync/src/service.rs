//! Async runtime for one mirrored book
//!
//! Drives a `Reconciler` from three concurrent sources: the live event feed,
//! a snapshot fetch (retried with exponential backoff), and operator
//! commands. The fetch starts only after the first event is buffered. A
//! single task owns the reconciler, so the book has exactly one writer. A `watch` shutdown signal stops the loop; dropping the service
//! closes the trade channel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use types::ids::MarketId;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::events::{BookEvent, BookSnapshot};
use crate::feed::MalformedEventError;
use crate::handle::BookHandle;
use crate::metrics::SyncMetrics;
use crate::notify::{trade_channel, TradeObservation, TradePublisher};
use crate::reconciler::{EventOutcome, Reconciler, SyncState};

/// Capacity of the channel the transport pushes parsed events into.
pub const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// One item from the transport: a parsed event or the reason it wasn't.
pub type FeedItem = Result<BookEvent, MalformedEventError>;

/// Fetches a point-in-time book from the venue.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self, symbol: &MarketId, depth: u8) -> Result<BookSnapshot, SyncError>;
}

/// Operator commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Discard the book and rebuild from a fresh snapshot.
    Resync,
}

/// Snapshot retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// 0 retries forever.
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            initial: config.retry_initial(),
            max: config.retry_max(),
            max_attempts: config.snapshot_max_attempts,
        }
    }

    /// Delay after the `attempt`th failure (1-based): doubles, capped.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts != 0 && attempts >= self.max_attempts
    }
}

/// Fetch a snapshot, retrying failures until success or abandonment.
pub async fn fetch_with_retry(
    source: Arc<dyn SnapshotSource>,
    symbol: MarketId,
    depth: u8,
    policy: RetryPolicy,
    metrics: Arc<SyncMetrics>,
) -> Result<BookSnapshot, SyncError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match source.fetch_snapshot(&symbol, depth).await {
            Ok(snapshot) => {
                info!(
                    symbol = %symbol,
                    attempt,
                    sequence = snapshot.sequence,
                    orders = snapshot.order_count(),
                    "Snapshot fetched"
                );
                return Ok(snapshot);
            }
            Err(err) => {
                metrics.record_snapshot_failure();
                if policy.exhausted(attempt) {
                    error!(symbol = %symbol, attempts = attempt, error = %err, "Snapshot fetch abandoned");
                    return Err(SyncError::SnapshotAbandoned { attempts: attempt });
                }
                let delay = policy.delay_after(attempt);
                warn!(
                    symbol = %symbol,
                    attempt,
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "Snapshot fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Caller-side ends of the service's channels.
#[derive(Debug)]
pub struct ServiceChannels {
    /// Transport pushes feed items here.
    pub events: mpsc::Sender<FeedItem>,
    pub commands: mpsc::Sender<Command>,
    /// Send `true` to stop the service.
    pub shutdown: watch::Sender<bool>,
    pub trades: mpsc::Receiver<TradeObservation>,
    pub book: BookHandle,
    pub metrics: Arc<SyncMetrics>,
}

/// State at the moment the service stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReport {
    pub state: SyncState,
    pub last_sequence: u64,
    pub counters: BTreeMap<String, u64>,
}

/// The single-writer task for one book.
pub struct BookSyncService {
    config: SyncConfig,
    reconciler: Reconciler,
    publisher: TradePublisher,
    source: Arc<dyn SnapshotSource>,
    metrics: Arc<SyncMetrics>,
    events: mpsc::Receiver<FeedItem>,
    commands: mpsc::Receiver<Command>,
    shutdown: watch::Receiver<bool>,
}

impl BookSyncService {
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn SnapshotSource>,
    ) -> Result<(Self, ServiceChannels), SyncError> {
        config.validate()?;

        let metrics = Arc::new(SyncMetrics::new());
        let reconciler = Reconciler::from_config(&config, metrics.clone());
        let (publisher, trades) = trade_channel(config.trade_channel_capacity, metrics.clone());
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let channels = ServiceChannels {
            events: event_tx,
            commands: command_tx,
            shutdown: shutdown_tx,
            trades,
            book: reconciler.book(),
            metrics: metrics.clone(),
        };

        let service = Self {
            config,
            reconciler,
            publisher,
            source,
            metrics,
            events: event_rx,
            commands: command_rx,
            shutdown: shutdown_rx,
        };

        Ok((service, channels))
    }

    /// Run on the current runtime as a background task.
    pub fn spawn(self) -> JoinHandle<Result<ServiceReport, SyncError>> {
        tokio::spawn(self.run())
    }

    /// Run until shutdown, feed close, or snapshot abandonment.
    pub async fn run(mut self) -> Result<ServiceReport, SyncError> {
        let policy = RetryPolicy::from_config(&self.config);
        let mut fetch: Option<JoinHandle<Result<BookSnapshot, SyncError>>> = None;

        info!(symbol = %self.config.symbol, "Book sync service started");

        let result = loop {
            // Fetch only once the feed is flowing, so the buffer overlaps the snapshot.
            if self.reconciler.state() == SyncState::AwaitingSnapshot
                && self.reconciler.pending_len() > 0
                && fetch.is_none()
            {
                fetch = Some(tokio::spawn(fetch_with_retry(
                    self.source.clone(),
                    self.config.symbol.clone(),
                    self.config.snapshot_depth,
                    policy,
                    self.metrics.clone(),
                )));
            }
            let accepting = self.reconciler.can_accept();

            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("Shutdown signal received");
                        break Ok(());
                    }
                }

                Some(command) = self.commands.recv() => match command {
                    Command::Resync => {
                        if let Some(handle) = fetch.take() {
                            handle.abort();
                        }
                        self.reconciler.force_resync();
                    }
                },

                joined = join_fetch(&mut fetch), if fetch.is_some() => {
                    fetch = None;
                    match joined {
                        Ok(Ok(snapshot)) => self.on_snapshot(snapshot),
                        Ok(Err(err)) => break Err(err),
                        Err(join_err) => {
                            break Err(SyncError::SnapshotFetchFailure(join_err.to_string()));
                        }
                    }
                }

                item = self.events.recv(), if accepting => match item {
                    Some(item) => self.on_item(item),
                    None => {
                        info!("Event feed closed");
                        break Ok(());
                    }
                },
            }
        };

        if let Some(handle) = fetch.take() {
            handle.abort();
        }

        let report = ServiceReport {
            state: self.reconciler.state(),
            last_sequence: self.reconciler.book().last_sequence(),
            counters: self.metrics.export(),
        };
        match &result {
            Ok(()) => info!(state = ?report.state, last_sequence = report.last_sequence, "Book sync service stopped"),
            Err(err) => error!(error = %err, "Book sync service failed"),
        }
        result.map(|()| report)
    }

    fn on_item(&mut self, item: FeedItem) {
        let event = match item {
            Ok(event) => event,
            Err(err) => {
                self.metrics.record_malformed();
                warn!(sequence = ?err.sequence(), error = %err, "Skipping malformed event");
                return;
            }
        };

        match self.reconciler.on_event(event) {
            Ok(EventOutcome::Applied {
                trade: Some(trade), ..
            }) => {
                self.publisher.publish(trade);
            }
            Ok(EventOutcome::ResyncRequired(gap)) => {
                info!(expected = gap.expected, got = gap.got, "Resync triggered by sequence gap");
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "Event rejected"),
        }
    }

    fn on_snapshot(&mut self, snapshot: BookSnapshot) {
        match self.reconciler.on_snapshot(snapshot) {
            Ok(summary) => {
                for trade in summary.trades {
                    self.publisher.publish(trade);
                }
                if let Some(gap) = summary.resync {
                    info!(expected = gap.expected, got = gap.got, "Resync triggered while draining buffer");
                }
            }
            Err(err) => debug!(error = %err, "Snapshot not loaded"),
        }
    }
}

async fn join_fetch(
    fetch: &mut Option<JoinHandle<Result<BookSnapshot, SyncError>>>,
) -> Result<Result<BookSnapshot, SyncError>, tokio::task::JoinError> {
    match fetch {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

//! Offline book replay
//!
//! Loads a recorded level-3 snapshot, replays a JSON-lines feed capture
//! behind it, and prints the resulting top of book, depth and checksum.
//! Exits non-zero on a checksum mismatch or a gap under `force_resync`.

use std::fs;
use std::io::{self, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use book_sync::error::BookError;
use book_sync::replay::ReplayEngine;
use book_sync::sequence::GapPolicy;
use book_sync::snapshot::DigestBuilder;
use book_sync::telemetry;
use types::ids::MarketId;
use types::numeric::Price;
use types::order::Side;

#[derive(Debug, Parser)]
#[command(name = "book-replay", version, about = "Replay a recorded snapshot and feed capture")]
struct Args {
    /// Level-3 snapshot JSON file
    #[arg(long)]
    snapshot: PathBuf,

    /// JSON-lines feed capture ("-" reads stdin)
    #[arg(long)]
    feed: PathBuf,

    /// Product id, e.g. BTC-USD
    #[arg(long, default_value = "BTC-USD")]
    symbol: String,

    /// apply_and_continue or force_resync
    #[arg(long, default_value = "apply_and_continue")]
    gap_policy: GapPolicy,

    /// Feed events delivered before the snapshot is loaded
    #[arg(long, default_value_t = 0)]
    snapshot_after: usize,

    /// Levels per side to print
    #[arg(long, default_value_t = 5)]
    depth: usize,

    /// Fail unless the final book checksum matches
    #[arg(long)]
    expected_checksum: Option<String>,

    /// Print the full digest as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    telemetry::init_tracing("info").context("failed to install tracing subscriber")?;
    let args = Args::parse();

    let symbol = MarketId::try_new(args.symbol.as_str())
        .with_context(|| format!("invalid symbol {:?}, expected BASE-QUOTE", args.symbol))?;
    let snapshot = fs::read_to_string(&args.snapshot)
        .with_context(|| format!("reading snapshot {}", args.snapshot.display()))?;

    let mut engine = ReplayEngine::new(symbol)
        .with_gap_policy(args.gap_policy)
        .with_snapshot_after(args.snapshot_after);
    if let Some(expected) = args.expected_checksum.clone() {
        engine = engine.with_expected_checksum(expected);
    }

    let result = if args.feed.as_os_str() == "-" {
        engine.replay_lines(&snapshot, io::stdin().lock())
    } else {
        let file = fs::File::open(&args.feed)
            .with_context(|| format!("opening feed {}", args.feed.display()))?;
        engine.replay_lines(&snapshot, BufReader::new(file))
    }?;

    info!(
        trades = result.trades.len(),
        checksum = %result.metrics.state_checksum,
        "Replay finished"
    );

    if args.json {
        let digest = DigestBuilder::new().build(&result.book, 0);
        println!("{}", serde_json::to_string_pretty(&digest)?);
        return Ok(());
    }

    let book = &result.book;
    println!("symbol:        {}", book.symbol);
    println!("last sequence: {}", book.last_sequence());
    println!("orders:        {}", book.order_count());
    println!("best bid:      {}", or_dash(book.best_bid()));
    println!("best ask:      {}", or_dash(book.best_ask()));
    if let Ok(spread) = book.spread() {
        println!("spread:        {spread}");
    }
    for side in [Side::Sell, Side::Buy] {
        println!("{side}:");
        for level in book.depth(args.depth, side) {
            println!(
                "  {:>16} {:>16} ({} orders)",
                level.price(),
                level.total_size(),
                level.order_count()
            );
        }
    }
    println!("events read:   {}", result.metrics.events_read);
    println!("applied:       {}", result.metrics.events_applied);
    println!("stale:         {}", result.metrics.events_stale);
    println!("malformed:     {}", result.metrics.malformed_events);
    println!("gaps:          {}", result.metrics.gaps_detected);
    println!("trades:        {}", result.trades.len());
    println!("checksum:      {}", result.metrics.state_checksum);

    Ok(())
}

fn or_dash(price: Result<Price, BookError>) -> String {
    price.map(|p| p.to_string()).unwrap_or_else(|_| "-".into())
}

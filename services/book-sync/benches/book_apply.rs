//! Benchmarks for snapshot load and live event application

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use book_sync::events::{BookEvent, BookSnapshot, DoneReason, EventPayload, SnapshotEntry};
use book_sync::reconciler::Reconciler;
use types::ids::{MarketId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::{OrderType, Side};

fn qty(s: &str) -> Quantity {
    s.parse().unwrap()
}

fn snapshot(orders_per_side: u64) -> BookSnapshot {
    let entry = |id: String, price: u64| SnapshotEntry {
        order_id: OrderId::new(id),
        price: Price::from_u64(price),
        size: qty("1.5"),
    };
    BookSnapshot {
        sequence: 1_000,
        bids: (0..orders_per_side)
            .map(|i| entry(format!("b{i}"), 50_000 - i % 200))
            .collect(),
        asks: (0..orders_per_side)
            .map(|i| entry(format!("a{i}"), 50_001 + i % 200))
            .collect(),
    }
}

/// Add-then-cancel pairs with a match every tenth event.
fn live_events(start: u64, count: u64) -> Vec<BookEvent> {
    (0..count)
        .map(|i| {
            let sequence = start + i;
            let id = OrderId::new(format!("live{}", i / 2));
            let payload = if i % 10 == 9 {
                EventPayload::Match {
                    trade_id: Some(i),
                    maker_order_id: OrderId::new(format!("a{}", i % 50)),
                    taker_order_id: OrderId::new("taker"),
                    side: Side::Sell,
                    price: Price::from_u64(50_001 + i % 50),
                    size: qty("0.001"),
                }
            } else if i % 2 == 0 {
                EventPayload::Received {
                    order_id: id,
                    side: Side::Buy,
                    order_type: OrderType::Limit,
                    price: Some(Price::from_u64(49_900 + i % 100)),
                    size: Some(qty("0.25")),
                }
            } else {
                EventPayload::Done {
                    order_id: id,
                    side: Side::Buy,
                    reason: DoneReason::Canceled,
                    price: None,
                    remaining_size: None,
                }
            };
            BookEvent::new(sequence, 0, payload)
        })
        .collect()
}

fn benchmark_snapshot_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_load");

    for size in [1_000u64, 10_000, 50_000] {
        let snap = snapshot(size);
        group.throughput(Throughput::Elements(size * 2));
        group.bench_with_input(BenchmarkId::from_parameter(size), &snap, |b, snap| {
            b.iter(|| {
                let mut reconciler = Reconciler::with_defaults(MarketId::new("BTC-USD"));
                black_box(reconciler.on_snapshot(snap.clone()).unwrap());
            });
        });
    }

    group.finish();
}

fn benchmark_live_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("live_apply");
    let events = live_events(1_001, 10_000);
    group.throughput(Throughput::Elements(events.len() as u64));

    group.bench_function("10k_events", |b| {
        b.iter_batched(
            || {
                let mut reconciler = Reconciler::with_defaults(MarketId::new("BTC-USD"));
                reconciler.on_snapshot(snapshot(1_000)).unwrap();
                (reconciler, events.clone())
            },
            |(mut reconciler, events)| {
                for event in events {
                    black_box(reconciler.on_event(event).unwrap());
                }
            },
            criterion::BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn benchmark_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_drain");
    let events = live_events(1_001, 10_000);

    group.bench_function("drain_10k_after_snapshot", |b| {
        b.iter_batched(
            || {
                let mut reconciler = Reconciler::with_defaults(MarketId::new("BTC-USD"));
                for event in events.iter().cloned() {
                    reconciler.on_event(event).unwrap();
                }
                reconciler
            },
            |mut reconciler| black_box(reconciler.on_snapshot(snapshot(1_000)).unwrap()),
            criterion::BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, benchmark_snapshot_load, benchmark_live_apply, benchmark_drain);
criterion_main!(benches);

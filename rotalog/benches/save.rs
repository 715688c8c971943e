//! Microbenchmarks for the `save()` and `query()` paths.
//!
//! Run with: `cargo bench -p rotalog -- save`

#![allow(missing_docs)]

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rotalog::config::{ManualClock, StoreConfig};
use rotalog::record::{EventKind, LogRecord, RecordFormatter};
use rotalog::store::Store;
use tempfile::tempdir;

const BASE: i64 = 1_700_000_000_000;

/// Creates a store under a temporary directory, driven by a manual clock.
fn setup_store(max_total_bytes: u64, max_segment_count: u64) -> (Store, Arc<ManualClock>, RecordFormatter, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = StoreConfig::new(temp_dir.path().join("bench_logs"))
        .with_limits(max_total_bytes, max_segment_count);
    let formatter = RecordFormatter::from_config(&config);
    let clock = Arc::new(ManualClock::new(DateTime::from_timestamp_millis(BASE).unwrap()));
    let store = Store::with_clock(config, clock.clone()).unwrap();
    (store, clock, formatter, temp_dir)
}

fn line(clock: &ManualClock, formatter: &RecordFormatter, len: usize) -> String {
    let record = LogRecord::new(clock.now(), EventKind::Info, "x".repeat(len))
        .with_thread("bench")
        .with_tag("BENCH");
    formatter.format(&record)
}

fn bench_save_append(c: &mut Criterion) {
    let (mut store, clock, formatter, _dir) = setup_store(1 << 30, 8);

    c.bench_function("save/append", |b| {
        b.iter(|| {
            clock.advance(TimeDelta::milliseconds(1));
            store.save(black_box(&line(&clock, &formatter, 64)));
        });
    });
}

fn bench_save_rotating(c: &mut Criterion) {
    let mut group = c.benchmark_group("save/rotating_segment_count");

    for count in [2u64, 8, 32] {
        // Small segments so rotation happens every few saves.
        let (mut store, clock, formatter, _dir) = setup_store(count * 1024, count);

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                clock.advance(TimeDelta::milliseconds(1));
                store.save(black_box(&line(&clock, &formatter, 200)));
            });
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query/window");
    let (mut store, clock, formatter, _dir) = setup_store(8 << 20, 8);

    // Ten days of records, one per minute.
    for _ in 0..(10 * 24 * 60) {
        store.save(&line(&clock, &formatter, 80));
        clock.advance(TimeDelta::minutes(1));
    }
    let start = DateTime::<Utc>::from_timestamp_millis(BASE).unwrap();

    for hours in [1i64, 24, 240] {
        group.bench_with_input(BenchmarkId::from_parameter(hours), &hours, |b, &hours| {
            let from = start + TimeDelta::days(5);
            let to = from + TimeDelta::hours(hours);
            b.iter(|| black_box(store.query(black_box(from), black_box(to))));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_save_append,
    bench_save_rotating,
    bench_query,
);
criterion_main!(benches);

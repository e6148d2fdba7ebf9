//! Benchmarks for the reading cache and analysis
//!
//! Run with: cargo bench

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use glucotray::*;
use tempfile::tempdir;

/// One reading every 5 minutes, ending now
fn create_test_readings(count: usize) -> Vec<Reading> {
    let now = Utc::now();
    (0..count)
        .map(|i| {
            let ts = now - Duration::minutes(5 * (count - 1 - i) as i64);
            Reading::new(ts, 5.0 + (i % 40) as f64 * 0.2).unwrap()
        })
        .collect()
}

fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");

    // A full day at 5-minute sampling
    let day = create_test_readings(288);
    group.throughput(Throughput::Elements(day.len() as u64));

    group.bench_function("ingest_fresh_day", |b| {
        b.iter(|| {
            let mut store = ReadingStore::open_in_memory().unwrap();
            store.ingest(black_box(&day)).unwrap()
        })
    });

    group.bench_function("ingest_duplicate_day", |b| {
        let dir = tempdir().unwrap();
        let mut store = ReadingStore::open(dir.path().join("bench.db")).unwrap();
        store.ingest(&day).unwrap();

        b.iter(|| store.ingest(black_box(&day)).unwrap());
    });

    group.bench_function("query_range_24h", |b| {
        let mut store = ReadingStore::open_in_memory().unwrap();
        store.ingest(&day).unwrap();

        b.iter(|| store.query_range(black_box(Duration::hours(24))).unwrap());
    });

    group.finish();
}

fn bench_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("analysis");
    let day = create_test_readings(288);

    group.bench_function("compute_trend", |b| {
        b.iter(|| compute_trend(black_box(&day)))
    });

    group.bench_function("chart_five_minute", |b| {
        b.iter(|| ChartSeries::five_minute(black_box(&day)))
    });

    group.bench_function("alert_evaluate", |b| {
        let engine = AlertEngine::new(Thresholds::default());
        let mut state = AlertState::new();

        b.iter(|| {
            for reading in &day {
                black_box(engine.evaluate(&mut state, reading.value()));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_store, bench_analysis);
criterion_main!(benches);

//! Microbenchmarks for the append path and the per-frame read path.
//!
//! Run with: `cargo bench -p rivulet -- append`

#![allow(missing_docs, clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rivulet::config::{EvictionPolicy, StoreConfig};
use rivulet::store::{Appender, Store};
use tempfile::{TempDir, tempdir};

/// Small slots so that eviction runs during the benchmark.
fn setup_store(policy: EvictionPolicy) -> (Appender<f32>, TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = StoreConfig::default()
        .with_geometry(65_536, 1_024)
        .with_eviction(policy)
        .with_cache_dir(temp_dir.path());
    let writer = Store::<f32>::create("bench", config).unwrap();
    (writer, temp_dir)
}

fn bench_append_single(c: &mut Criterion) {
    let mut group = c.benchmark_group("append/single");

    for policy in [EvictionPolicy::PersistToDisk, EvictionPolicy::DiscardOnEvict] {
        let (mut writer, _dir) = setup_store(policy);
        let mut value = 0.0f32;

        group.bench_with_input(BenchmarkId::from_parameter(format!("{policy:?}")), &policy, |b, _| {
            b.iter(|| {
                value += 0.25;
                if writer.append(black_box(value)).is_err() {
                    writer.clear().unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_append_block(c: &mut Criterion) {
    let (mut writer, _dir) = setup_store(EvictionPolicy::DiscardOnEvict);

    c.bench_function("append/block", |b| {
        b.iter(|| {
            if writer.append_block(black_box(1.5)).is_err() {
                writer.clear().unwrap();
            }
        });
    });
}

fn bench_frame_read(c: &mut Criterion) {
    let (mut writer, _dir) = setup_store(EvictionPolicy::PersistToDisk);
    for n in 0..1_000_000u32 {
        writer.append((n % 4_096) as f32).unwrap();
    }
    writer.wait_for_evictions();
    let reader = writer.reader();

    let mut group = c.benchmark_group("read/frame");
    for span in [1_000u32, 100_000] {
        group.bench_with_input(BenchmarkId::new("range_summary", span), &span, |b, &span| {
            b.iter(|| reader.range_summary(black_box(10), black_box(10 + span)).unwrap());
        });

        let mut window = reader.window();
        let mut first = 0u32;
        group.bench_with_input(BenchmarkId::new("window_scroll", span), &span, |b, &span| {
            b.iter(|| {
                first = (first + 97) % (900_000 - span);
                window.update(black_box(first), black_box(first + span)).unwrap().len()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_append_single, bench_append_block, bench_frame_read);
criterion_main!(benches);

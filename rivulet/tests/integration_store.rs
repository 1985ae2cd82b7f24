//! Integration tests for the full store lifecycle.
//!
//! These tests exercise the complete flow from store creation through
//! appends, eviction to the backing file, and querying, using small slot
//! and block sizes so that paging happens after a handful of samples.

use std::thread;

use rivulet::config::{EvictionPolicy, StoreConfig};
use rivulet::error::{QueryError, RivuletError};
use rivulet::index::Summary;
use rivulet::store::Store;
use tempfile::{TempDir, tempdir};

/// Geometry used throughout: 4-sample blocks, 8-sample slots.
fn paged_config(temp_dir: &TempDir) -> StoreConfig {
    StoreConfig::default()
        .with_geometry(8, 4)
        .with_cache_dir(temp_dir.path())
}

/// Deterministic, non-monotonic test signal.
#[allow(clippy::cast_precision_loss)]
fn signal(n: u32) -> f32 {
    ((n * 7_919) % 1_000) as f32 - 500.0
}

#[test]
fn test_block_summaries_of_known_values() {
    let temp_dir = tempdir().unwrap();
    let mut writer = Store::<f32>::create("scenario", paged_config(&temp_dir)).unwrap();
    let reader = writer.reader();

    writer
        .append_slice(&[5.0, 1.0, 3.0, 9.0, 2.0, 8.0, 0.0, 4.0])
        .unwrap();

    assert_eq!(reader.block_summary(0), Some(Summary { min: 1.0, max: 9.0 }));
    assert_eq!(reader.block_summary(1), Some(Summary { min: 0.0, max: 8.0 }));
    assert_eq!(
        reader.range_summary(0, 7).unwrap(),
        Summary { min: 0.0, max: 9.0 }
    );
    assert_eq!(reader.read_range(2, 5).unwrap(), vec![3.0, 9.0, 2.0, 8.0]);
}

#[test]
fn test_round_trip_across_eviction() {
    let temp_dir = tempdir().unwrap();
    let mut writer = Store::<f32>::create("roundtrip", paged_config(&temp_dir)).unwrap();
    let reader = writer.reader();

    let values: Vec<f32> = (0..203).map(signal).collect();
    writer.append_slice(&values).unwrap();
    writer.wait_for_evictions();

    // 26 slots started, the last two stay resident.
    let stats = reader.stats();
    assert_eq!(stats.slots, 26);
    assert_eq!(stats.slots_persisted, 24);
    assert_eq!(stats.resident_slots, 2);
    assert_eq!(stats.failed_evictions, 0);

    for (n, expected) in values.iter().enumerate() {
        assert_eq!(reader.read(u32::try_from(n).unwrap()).unwrap(), *expected);
    }
    assert_eq!(reader.read_range(0, 202).unwrap(), values);
    assert_eq!(reader.read_range(61, 190).unwrap(), values[61..=190].to_vec());
}

#[test]
fn test_range_summary_matches_brute_force() {
    let temp_dir = tempdir().unwrap();
    let mut writer = Store::<f32>::create("summary", paged_config(&temp_dir)).unwrap();
    let reader = writer.reader();

    let values: Vec<f32> = (0..150).map(signal).collect();
    writer.append_slice(&values).unwrap();
    writer.wait_for_evictions();

    for (first, last) in [(0, 149), (1, 2), (3, 4), (3, 12), (7, 8), (13, 100), (148, 149)] {
        let expected = Summary::scan(&values[first as usize..=last as usize]).unwrap();
        assert_eq!(
            reader.range_summary(first, last).unwrap(),
            expected,
            "range [{first}, {last}]"
        );
    }
}

#[test]
fn test_backing_file_layout() {
    let temp_dir = tempdir().unwrap();
    let mut writer = Store::<i64>::create("layout", paged_config(&temp_dir)).unwrap();
    let reader = writer.reader();

    writer.append_slice(&(0..24).collect::<Vec<i64>>()).unwrap();
    writer.wait_for_evictions();

    // Slot 0 evicted: samples 0..8 at offset n * 8.
    let raw = std::fs::read(temp_dir.path().join("layout.bin")).unwrap();
    assert_eq!(raw.len(), 64);
    assert_eq!(&raw[40..48], &5i64.to_ne_bytes());
    assert_eq!(reader.path(), temp_dir.path().join("layout.bin"));
}

#[test]
fn test_larger_resident_window() {
    let temp_dir = tempdir().unwrap();
    let config = paged_config(&temp_dir).with_resident_slots(4);
    let mut writer = Store::<f32>::create("wide", config).unwrap();
    let reader = writer.reader();

    writer.append_slice(&[1.0; 48]).unwrap();
    writer.wait_for_evictions();

    let stats = reader.stats();
    assert_eq!(stats.slots, 6);
    assert_eq!(stats.resident_slots, 4);
    assert_eq!(stats.slots_persisted, 2);
}

#[test]
fn test_concurrent_reader_sees_consistent_prefix() {
    let temp_dir = tempdir().unwrap();
    let config = StoreConfig::default()
        .with_geometry(64, 8)
        .with_cache_dir(temp_dir.path());
    let mut writer = Store::<f32>::create("concurrent", config).unwrap();
    let reader = writer.reader();

    let reader_thread = thread::spawn(move || {
        let mut checked = 0;
        loop {
            let len = reader.len();
            if len > 0 {
                let last = u32::try_from(len - 1).unwrap();
                let first = last.saturating_sub(500);
                let got = reader.read_range(first, last).unwrap();
                for (i, value) in got.iter().enumerate() {
                    assert_eq!(*value, signal(first + u32::try_from(i).unwrap()));
                }
                checked += 1;
            }
            if len >= 20_000 {
                return checked;
            }
        }
    });

    for n in 0..20_000 {
        writer.append(signal(n)).unwrap();
    }
    writer.wait_for_evictions();

    let checked = reader_thread.join().unwrap();
    assert!(checked > 0);
}

#[test]
fn test_discard_policy() {
    let temp_dir = tempdir().unwrap();
    let config = paged_config(&temp_dir).with_eviction(EvictionPolicy::DiscardOnEvict);
    let mut writer = Store::<f32>::create("discard", config).unwrap();
    let reader = writer.reader();

    writer.append_slice(&[3.0; 40]).unwrap();
    writer.wait_for_evictions();

    assert_eq!(reader.stats().slots_discarded, 3);
    assert_eq!(std::fs::metadata(reader.path()).unwrap().len(), 0);

    match reader.read_range(20, 30) {
        Err(RivuletError::Query(QueryError::Discarded { sample: 20, slot: 2 })) => {}
        other => panic!("expected discarded error, got: {other:?}"),
    }
    assert_eq!(reader.read_range(24, 39).unwrap(), vec![3.0; 16]);
}

#[test]
fn test_clear_then_reuse() {
    let temp_dir = tempdir().unwrap();
    let mut writer = Store::<f32>::create("reuse", paged_config(&temp_dir)).unwrap();
    let reader = writer.reader();

    writer.append_slice(&[9.0; 100]).unwrap();
    writer.clear().unwrap();
    assert!(reader.is_empty());
    assert_eq!(std::fs::metadata(reader.path()).unwrap().len(), 0);

    let values: Vec<f32> = (0..30).map(signal).collect();
    writer.append_slice(&values).unwrap();
    writer.wait_for_evictions();
    assert_eq!(reader.read_range(0, 29).unwrap(), values);
    assert_eq!(
        reader.range_summary(0, 29).unwrap(),
        Summary::scan(&values).unwrap()
    );
}

#[test]
fn test_dispose_removes_backing_file() {
    let temp_dir = tempdir().unwrap();
    let mut writer = Store::<f32>::create("gone", paged_config(&temp_dir)).unwrap();
    let reader = writer.reader();
    writer.append_slice(&[1.0; 50]).unwrap();

    writer.dispose().unwrap();
    assert!(!temp_dir.path().join("gone.bin").exists());

    match reader.read(0) {
        Err(RivuletError::Query(QueryError::Disposed)) => {}
        other => panic!("expected disposed error, got: {other:?}"),
    }
}

#[test]
fn test_new_session_truncates_old_file() {
    let temp_dir = tempdir().unwrap();
    {
        let mut writer = Store::<f32>::create("session", paged_config(&temp_dir)).unwrap();
        writer.append_slice(&[1.0; 64]).unwrap();
        writer.wait_for_evictions();
    }
    assert!(std::fs::metadata(temp_dir.path().join("session.bin")).unwrap().len() > 0);

    let writer = Store::<f32>::create("session", paged_config(&temp_dir)).unwrap();
    assert!(writer.is_empty());
    assert_eq!(std::fs::metadata(temp_dir.path().join("session.bin")).unwrap().len(), 0);
}

//! Integration tests for nearest-timestamp search on paged stores.

use rivulet::config::StoreConfig;
use rivulet::store::Store;
use rivulet::timestamp::TimestampSearch;
use tempfile::tempdir;

#[test]
fn test_search_across_evicted_slots() {
    let temp_dir = tempdir().unwrap();
    let config = StoreConfig::default()
        .with_geometry(32, 8)
        .with_cache_dir(temp_dir.path());
    let mut writer = Store::<i64>::create("ts", config).unwrap();

    // 1 kHz acquisition with every timestamp repeated twice.
    let base = 1_700_000_000_000i64;
    for n in 0..1_000i64 {
        writer.append(base + n / 2).unwrap();
    }
    writer.wait_for_evictions();
    let search = TimestampSearch::new(writer.reader());

    assert_eq!(search.closest_at_or_before(base + 100, 999).unwrap(), Some(201));
    assert_eq!(search.closest_at_or_before(base + 100, 150).unwrap(), Some(150));
    assert_eq!(search.closest_at_or_before(base - 1, 999).unwrap(), None);
    assert_eq!(search.closest_after(base + 100).unwrap(), Some(202));
    assert_eq!(search.closest_after(base + 499).unwrap(), Some(999));
    assert_eq!(search.closest_after(base - 1).unwrap(), Some(0));
}

#[test]
fn test_search_matches_linear_scan() {
    let temp_dir = tempdir().unwrap();
    let config = StoreConfig::default()
        .with_geometry(16, 4)
        .with_cache_dir(temp_dir.path());
    let mut writer = Store::<i64>::create("ts", config).unwrap();

    // Irregular gaps and plateaus.
    let timestamps: Vec<i64> = (0..150i64).map(|n| n * 3 - (n % 5) + (n / 7) * 11).collect();
    let mut sorted = timestamps.clone();
    sorted.sort_unstable();
    writer.append_slice(&sorted).unwrap();
    writer.wait_for_evictions();
    let reader = writer.reader();

    for t in [-5, 0, 1, 47, 200, 333, 499, 700, 10_000] {
        let before = sorted.iter().rposition(|&ts| ts <= t).map(|i| u32::try_from(i).unwrap());
        assert_eq!(reader.closest_at_or_before(t, 149).unwrap(), before, "at_or_before {t}");

        let after = sorted
            .iter()
            .position(|&ts| ts > t)
            .unwrap_or(sorted.len() - 1);
        assert_eq!(
            reader.closest_after(t).unwrap(),
            Some(u32::try_from(after).unwrap()),
            "after {t}"
        );
    }
}

#[test]
fn test_search_sees_partial_last_block() {
    let temp_dir = tempdir().unwrap();
    let config = StoreConfig::default()
        .with_geometry(16, 4)
        .with_cache_dir(temp_dir.path());
    let mut writer = Store::<i64>::create("ts", config).unwrap();
    let reader = writer.reader();

    writer.append_slice(&[10, 20, 30, 40, 50]).unwrap();
    assert_eq!(reader.closest_at_or_before(55, 4).unwrap(), Some(4));
    assert_eq!(reader.closest_after(45).unwrap(), Some(4));

    writer.append(60).unwrap();
    assert_eq!(reader.closest_after(55).unwrap(), Some(5));
}

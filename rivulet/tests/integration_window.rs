//! Integration tests for read windows.
//!
//! A window must return exactly what a direct range read returns, whatever
//! sequence of requests led up to it and wherever the samples live.

use rivulet::config::StoreConfig;
use rivulet::store::{Appender, Store};
use tempfile::{TempDir, tempdir};

const LEN: u32 = 2_000;

/// Store with 2_000 samples, most of them evicted to disk.
#[allow(clippy::cast_precision_loss)]
fn paged_store(temp_dir: &TempDir) -> Appender<f32> {
    let config = StoreConfig::default()
        .with_geometry(64, 8)
        .with_cache_dir(temp_dir.path());
    let mut writer = Store::<f32>::create("window", config).unwrap();
    for n in 0..LEN {
        writer.append((n % 97) as f32 * 0.5).unwrap();
    }
    writer.wait_for_evictions();
    writer
}

#[test]
fn test_forward_scroll_matches_direct_reads() {
    let temp_dir = tempdir().unwrap();
    let writer = paged_store(&temp_dir);
    let reader = writer.reader();
    let mut window = reader.window();

    let mut first = 0;
    while first + 200 < LEN {
        let expected = reader.read_range(first, first + 199).unwrap();
        assert_eq!(window.update(first, first + 199).unwrap(), expected.as_slice());
        first += 37;
    }
}

#[test]
fn test_backward_scroll_matches_direct_reads() {
    let temp_dir = tempdir().unwrap();
    let writer = paged_store(&temp_dir);
    let reader = writer.reader();
    let mut window = reader.window();

    let mut last = LEN - 1;
    while last >= 300 {
        let expected = reader.read_range(last - 299, last).unwrap();
        assert_eq!(window.update(last - 299, last).unwrap(), expected.as_slice());
        last -= 53;
    }
}

#[test]
fn test_jumps_and_zoom_match_direct_reads() {
    let temp_dir = tempdir().unwrap();
    let writer = paged_store(&temp_dir);
    let reader = writer.reader();
    let mut window = reader.window();

    // Fresh ranges, growing spans, and a jump back to the start.
    for (first, last) in [(1_500, 1_510), (10, 20), (0, 999), (900, 1_999), (5, 5), (1_999, 1_999)] {
        let expected = reader.read_range(first, last).unwrap();
        assert_eq!(
            window.update(first, last).unwrap(),
            expected.as_slice(),
            "range [{first}, {last}]"
        );
        assert!(window.capacity() >= (last - first + 1) as usize * 2);
    }
}

#[test]
fn test_window_follows_live_writer() {
    let temp_dir = tempdir().unwrap();
    let config = StoreConfig::default()
        .with_geometry(16, 4)
        .with_cache_dir(temp_dir.path());
    let mut writer = Store::<i64>::create("live", config).unwrap();
    let mut window = writer.reader().window();

    // The chart shows the newest 10 samples after every append.
    for n in 0..100i64 {
        writer.append(n).unwrap();
        if n >= 9 {
            let last = u32::try_from(n).unwrap();
            let visible = window.update(last - 9, last).unwrap();
            assert_eq!(visible, ((n - 9)..=n).collect::<Vec<_>>().as_slice());
        }
    }
}

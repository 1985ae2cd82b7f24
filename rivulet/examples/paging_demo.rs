//! Paging demo: a writer thread streams a synthetic 20 kHz signal into a
//! channel while a "chart" thread redraws the newest second every frame.
//!
//! Run with: `RUST_LOG=rivulet=debug cargo run -p rivulet --example paging_demo`

#![allow(missing_docs, clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rivulet::{Channel, StoreConfig};
use tracing_subscriber::EnvFilter;

const RATE_HZ: u32 = 20_000;
const SECONDS: u32 = 10;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cache_dir = std::env::temp_dir().join("rivulet_paging_demo");
    // Quarter-second slots so paging is visible within a few seconds.
    let config = StoreConfig::default()
        .with_geometry(RATE_HZ / 4 / 1_024 * 1_024, 1_024)
        .with_cache_dir(&cache_dir);

    let mut writer = Channel::create("demo", 2, config)?;
    let reader = writer.reader();
    let done = Arc::new(AtomicBool::new(false));

    let chart = {
        let done = Arc::clone(&done);
        thread::spawn(move || -> rivulet::Result<()> {
            let values = reader.values(0).map(|v| v.window());
            let Some(mut window) = values else {
                return Ok(());
            };
            let mut frames = 0u32;
            let mut worst = Duration::ZERO;

            while !done.load(Ordering::Acquire) {
                let rows = reader.row_count();
                if rows > u64::from(RATE_HZ) {
                    let last = (rows - 1) as u32;
                    let first = last - (RATE_HZ - 1);

                    let started = Instant::now();
                    let visible = window.update(first, last)?.len();
                    let summary = window.range_summary(first, last)?;
                    worst = worst.max(started.elapsed());
                    frames += 1;

                    if frames % 60 == 0 {
                        println!(
                            "frame {frames}: {visible} samples [{:.3}, {:.3}], worst frame {worst:?}",
                            summary.min, summary.max
                        );
                    }
                }
                thread::sleep(Duration::from_millis(16));
            }
            Ok(())
        })
    };

    let base = 1_700_000_000_000i64;
    let started = Instant::now();
    for n in 0..RATE_HZ * SECONDS {
        let t = n as f32 / RATE_HZ as f32;
        let ts = base + i64::from(n) * 1_000 / i64::from(RATE_HZ);
        writer.append_row(ts, &[(t * 50.0).sin(), (t * 3.0).cos()])?;

        // Pace the writer at roughly real time.
        if n % RATE_HZ == 0 {
            let target = Duration::from_secs(u64::from(n / RATE_HZ));
            if let Some(wait) = target.checked_sub(started.elapsed()) {
                thread::sleep(wait);
            }
        }
    }

    done.store(true, Ordering::Release);
    if let Ok(result) = chart.join() {
        result?;
    }

    let reader = writer.reader();
    let stats = reader.timestamps().stats();
    println!();
    println!("Rows: {}", reader.row_count());
    println!("Slots persisted: {}", stats.slots_persisted);
    println!("Resident slots: {}", stats.resident_slots);

    writer.dispose()?;
    Ok(())
}

//! CLI for the rivulet sample store.
//!
//! Provides commands for benchmarking the store, inspecting backing files,
//! and printing the effective store configuration.

use std::fmt::Display;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use memmap2::Mmap;
use rivulet::{EvictionPolicy, Sample, Store, StoreConfig, Summary};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// rivulet: paged, append-only time-series sample store CLI.
#[derive(Parser)]
#[command(name = "rivulet", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Run an append-path stress benchmark with per-frame query timing.
    Bench {
        /// Number of samples to append.
        #[arg(long, default_value = "10000000")]
        samples: u32,

        /// What happens to slots leaving memory.
        #[arg(long, default_value = "persist")]
        policy: Policy,

        /// Samples per slot.
        #[arg(long, default_value_t = rivulet::config::DEFAULT_SLOT_SIZE)]
        slot_size: u32,

        /// Samples per block.
        #[arg(long, default_value_t = rivulet::config::DEFAULT_BLOCK_SIZE)]
        block_size: u32,

        /// Directory for the backing file (defaults to a temp directory).
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Samples shown per simulated chart frame.
        #[arg(long, default_value = "100000")]
        frame_span: u32,
    },

    /// Decode and print samples from a backing file.
    Dump {
        /// Path to the `.bin` backing file.
        file: PathBuf,

        /// Element type stored in the file.
        #[arg(long, default_value = "f32")]
        kind: Kind,

        /// First sample to print.
        #[arg(long, default_value = "0")]
        first: u64,

        /// Last sample to print (defaults to the last sample in the file).
        #[arg(long)]
        last: Option<u64>,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Print the effective store configuration as JSON.
    Config {
        /// JSON config file; defaults are used for missing fields or a missing file.
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

/// Eviction policy selector.
#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    /// Write evicted slots to the backing file.
    Persist,
    /// Drop evicted slots.
    Discard,
}

impl From<Policy> for EvictionPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Persist => EvictionPolicy::PersistToDisk,
            Policy::Discard => EvictionPolicy::DiscardOnEvict,
        }
    }
}

/// Element type of a backing file.
#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    /// 4-byte floats (value stores).
    F32,
    /// 8-byte signed integers (timestamp stores).
    I64,
}

/// Output format for dumped samples.
#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON object with the samples and their min/max.
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Bench {
            samples,
            policy,
            slot_size,
            block_size,
            cache_dir,
            frame_span,
        } => {
            let cache_dir = cache_dir.unwrap_or_else(|| std::env::temp_dir().join("rivulet_bench"));
            let config = StoreConfig::default()
                .with_geometry(slot_size, block_size)
                .with_eviction(policy.into())
                .with_cache_dir(cache_dir);
            cmd_bench(samples, config, frame_span)
        }
        Commands::Dump {
            file,
            kind,
            first,
            last,
            format,
        } => match kind {
            Kind::F32 => cmd_dump::<f32>(&file, first, last, format),
            Kind::I64 => cmd_dump::<i64>(&file, first, last, format),
        },
        Commands::Config { path } => cmd_config(path.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Implements `rivulet bench`.
#[allow(clippy::cast_precision_loss)]
fn cmd_bench(samples: u32, config: StoreConfig, frame_span: u32) -> Result<(), Box<dyn std::error::Error>> {
    println!("rivulet append benchmark");
    println!("  Samples: {samples}");
    println!("  Slot size: {}", config.slot_size);
    println!("  Block size: {}", config.block_size);
    println!("  Eviction: {:?}", config.eviction);
    println!("  Cache dir: {}", config.cache_dir.display());
    println!();

    let mut writer = Store::<f32>::create("bench", config)?;
    let reader = writer.reader();

    println!("Appending {samples} samples...");
    let start = Instant::now();
    for n in 0..samples {
        writer.append((n % 10_000) as f32 * 0.001)?;
    }
    let append_elapsed = start.elapsed();
    writer.wait_for_evictions();
    let total_elapsed = start.elapsed();

    let ns_per_append = append_elapsed.as_nanos() as f64 / f64::from(samples.max(1));
    let appends_per_sec = f64::from(samples) / append_elapsed.as_secs_f64();

    println!();
    println!("Results:");
    println!("  Elapsed (appends): {append_elapsed:.3?}");
    println!("  Elapsed (with evictions): {total_elapsed:.3?}");
    println!("  Avg latency: {ns_per_append:.1} ns/append");
    println!("  Throughput: {appends_per_sec:.0} appends/sec");
    println!();
    println!("Store stats:");
    println!("{}", serde_json::to_string_pretty(&reader.stats())?);

    if reader.config().eviction == EvictionPolicy::DiscardOnEvict {
        println!();
        println!("Frame queries skipped: evicted samples are discarded under this policy.");
    } else if samples > frame_span && frame_span > 0 {
        let frames = frame_latency(&reader, samples, frame_span)?;
        println!();
        println!("Frame queries ({frame_span} samples, {} frames):", frames.count);
        println!("  Window update: avg {:.3?}, worst {:.3?}", frames.window_avg, frames.window_worst);
        println!("  Range summary: avg {:.3?}, worst {:.3?}", frames.summary_avg, frames.summary_worst);
    }

    writer.dispose()?;
    Ok(())
}

/// Per-frame query timings.
struct FrameLatency {
    count: u32,
    window_avg: Duration,
    window_worst: Duration,
    summary_avg: Duration,
    summary_worst: Duration,
}

/// Simulates a chart scrolling backward through the store, one frame at a
/// time, timing the window update and the min/max query of each frame.
fn frame_latency(
    reader: &rivulet::StoreReader<f32>,
    samples: u32,
    span: u32,
) -> Result<FrameLatency, Box<dyn std::error::Error>> {
    const FRAMES: u32 = 120;
    let step = ((samples - span) / FRAMES).max(1);

    let mut window = reader.window();
    let (mut window_total, mut window_worst) = (Duration::ZERO, Duration::ZERO);
    let (mut summary_total, mut summary_worst) = (Duration::ZERO, Duration::ZERO);
    let mut count = 0u32;

    let mut last = samples - 1;
    while count < FRAMES && last >= span {
        let first = last + 1 - span;

        let started = Instant::now();
        window.update(first, last)?;
        let elapsed = started.elapsed();
        window_total += elapsed;
        window_worst = window_worst.max(elapsed);

        let started = Instant::now();
        reader.range_summary(first, last)?;
        let elapsed = started.elapsed();
        summary_total += elapsed;
        summary_worst = summary_worst.max(elapsed);

        count += 1;
        match last.checked_sub(step) {
            Some(next) => last = next,
            None => break,
        }
    }

    debug!(frames = count, "measured frame latency");
    let divisor = count.max(1);
    Ok(FrameLatency {
        count,
        window_avg: window_total / divisor,
        window_worst,
        summary_avg: summary_total / divisor,
        summary_worst,
    })
}

/// Samples decoded from a backing file.
#[derive(Debug, Serialize)]
struct Dump<T> {
    kind: &'static str,
    first: u64,
    samples: Vec<T>,
    summary: Option<Summary<T>>,
}

/// Decodes samples `[first, last]` from the raw bytes of a backing file.
///
/// `last` defaults to, and is clamped to, the last whole sample in `bytes`.
fn decode_range<T: Sample>(bytes: &[u8], first: u64, last: Option<u64>) -> Result<Dump<T>, Box<dyn std::error::Error>> {
    let width = T::WIDTH as u64;
    let available = bytes.len() as u64 / width;
    if available == 0 {
        return Err("backing file holds no samples".into());
    }

    let last = last.unwrap_or(available - 1).min(available - 1);
    if first > last {
        return Err(format!("invalid range: first {first} > last {last} ({available} samples in file)").into());
    }

    let start = usize::try_from(first * width)?;
    let end = usize::try_from((last + 1) * width)?;
    let samples: Vec<T> = bytes[start..end].chunks_exact(T::WIDTH).map(T::decode).collect();
    let summary = Summary::scan(&samples);

    Ok(Dump {
        kind: T::NAME,
        first,
        samples,
        summary,
    })
}

/// Implements `rivulet dump <file>`.
fn cmd_dump<T: Sample + Serialize + Display>(
    path: &Path,
    first: u64,
    last: Option<u64>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(path).map_err(|e| format!("cannot open '{}': {e}", path.display()))?;
    if file.metadata()?.len() == 0 {
        return Err(format!("'{}' is empty (no slot has been evicted yet)", path.display()).into());
    }

    // SAFETY: The map is read-only and dropped before returning. Backing
    // files are only written by a live store; dumping a file that is being
    // written concurrently may show stale samples but never reads outside
    // the mapping.
    let mmap = unsafe { Mmap::map(&file)? };
    let dump = decode_range::<T>(&mmap, first, last)?;

    match format {
        OutputFormat::Csv => {
            println!("sample,value");
            for (i, value) in dump.samples.iter().enumerate() {
                println!("{},{value}", dump.first + i as u64);
            }
            if let Some(summary) = &dump.summary {
                eprintln!("min {}, max {}", summary.min, summary.max);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&dump)?);
        }
    }

    Ok(())
}

/// Implements `rivulet config`.
fn cmd_config(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    config.validate()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

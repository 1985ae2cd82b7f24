//! # rivulet
//!
//! Paged, append-only time-series sample store.
//!
//! rivulet stores long acquisition sessions of numeric samples (values and
//! their timestamps) at sustained rates of tens of thousands of samples per
//! second. Recent data stays in memory; older data is paged out to a flat
//! backing file so memory use stays bounded however long the session runs.
//! Range queries are fast enough to redraw a chart every frame.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Dense `u32` sample numbers as the only key; no out-of-order inserts
//! - Single writer enforced by ownership, any number of concurrent readers
//! - Per-block min/max index for O(blocks) range summaries and timestamp search
//! - Eviction on background threads; memory is only released after a durable write
//! - Reusable per-consumer read windows that stitch memory and disk
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rivulet::{Channel, StoreConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // One timestamp store plus two value stores
//! let mut writer = Channel::create("adc", 2, StoreConfig::default())?;
//!
//! for i in 0..100_000i64 {
//!     writer.append_row(1_700_000_000_000 + i, &[0.5, -0.5])?;
//! }
//!
//! // Readers are independent handles; each chart owns its own window
//! let reader = writer.reader();
//! let first = reader.row_at_or_before(1_700_000_010_000)?.unwrap_or(0);
//!
//! let mut window = reader.values(0).expect("value store 0").window();
//! let visible = window.update(first, first + 999)?;
//! let summary = reader.values(0).expect("value store 0").range_summary(first, first + 999)?;
//! println!("{} samples, min {} max {}", visible.len(), summary.min, summary.max);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Store`] creates a store and hands out its [`Appender`]
//! - [`Appender`] is the move-only writer: append, clear, dispose
//! - [`StoreReader`] is the clonable read handle: point, range, summary
//! - [`ReadWindow`] is a per-consumer buffer over a reader
//! - [`Channel`] groups one timestamp store with N value stores
//!
//! ## Modules
//!
//! - [`store`]: Store lifecycle, append path, eviction, reads
//! - [`window`]: Read windows
//! - [`timestamp`]: Nearest-timestamp search
//! - [`channel`]: Timestamp + value store groups
//! - [`index`]: Per-block min/max summaries
//! - [`file`]: Backing file format and positioned I/O
//! - [`config`]: Paging geometry and eviction policy
//! - [`sample`]: Element types and their encoding
//! - [`error`]: Error types

pub mod channel;
pub mod config;
pub mod error;
pub mod file;
pub mod index;
pub mod sample;
mod slot;
pub mod store;
pub mod timestamp;
pub mod window;

// Re-export primary API types at crate root for convenience.
pub use channel::{Channel, ChannelReader, ChannelWriter};
pub use config::{EvictionPolicy, StoreConfig};
pub use error::{Result, RivuletError};
pub use index::Summary;
pub use sample::{Sample, SampleNumber};
pub use store::{Appender, Store, StoreReader, StoreStats};
pub use timestamp::TimestampSearch;
pub use window::ReadWindow;

//! Per-consumer read windows.
//!
//! A [`ReadWindow`] keeps a contiguous buffer of samples around the range
//! its owner last asked for. A chart that redraws every frame usually asks
//! for a range overlapping the previous one, so most of each request is
//! served from the buffer and only the newly exposed edge is read from the
//! store.
//!
//! ```text
//!   start                                        start + capacity
//!     │          valid range                            │
//!     ▼     ┌───────────────────────┐                   ▼
//!     [.....|#######################|...................]
//!                 ▲            ▲
//!               first        last     (request served from the buffer)
//! ```
//!
//! The buffer grows to three times the requested span whenever a request is
//! wider than half of it, and re-centers (keeping a third of its capacity
//! behind `first`) when a request falls outside it.

use std::ops::Range;

use crate::error::Result;
use crate::index::Summary;
use crate::sample::{Sample, SampleNumber};
use crate::store::StoreReader;

/// A reusable buffer over one store, owned by a single consumer.
///
/// # Example
///
/// ```rust,no_run
/// use rivulet::config::StoreConfig;
/// use rivulet::store::Store;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut writer = Store::<f32>::create("ch0-values", StoreConfig::default())?;
/// writer.append_slice(&[0.5; 4096])?;
///
/// let mut window = writer.reader().window();
/// let visible = window.update(1000, 1999)?;
/// assert_eq!(visible.len(), 1000);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ReadWindow<T: Sample> {
    reader: StoreReader<T>,
    buffer: Vec<T>,
    /// Sample number of `buffer[0]`.
    start: u64,
    /// Sample numbers currently held in the buffer.
    valid: Range<u64>,
    /// Store epoch the contents were read under.
    epoch: u64,
}

impl<T: Sample> ReadWindow<T> {
    /// Creates an empty window over `reader`. The buffer is allocated on the
    /// first [`ReadWindow::update`].
    pub fn new(reader: StoreReader<T>) -> Self {
        let epoch = reader.epoch();
        Self {
            reader,
            buffer: Vec::new(),
            start: 0,
            valid: 0..0,
            epoch,
        }
    }

    /// Returns the samples `[first, last]`, reading whatever the buffer does
    /// not already hold.
    ///
    /// The returned slice borrows the window, so it cannot be kept across
    /// the next call.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidRange`] or [`QueryError::OutOfRange`] for
    /// bad bounds, [`QueryError::Discarded`] if part of the range was
    /// dropped, or a backing file error if a disk read fails.
    ///
    /// [`QueryError::InvalidRange`]: crate::error::QueryError::InvalidRange
    /// [`QueryError::OutOfRange`]: crate::error::QueryError::OutOfRange
    /// [`QueryError::Discarded`]: crate::error::QueryError::Discarded
    pub fn update(&mut self, first: SampleNumber, last: SampleNumber) -> Result<&[T]> {
        self.reader.check_range(first, last)?;

        let epoch = self.reader.epoch();
        if epoch != self.epoch {
            self.epoch = epoch;
            self.invalidate();
        }

        let span = (last - first) as usize + 1;
        if span > self.buffer.len() / 2 {
            self.buffer = vec![T::default(); span * 3];
            self.invalidate();
        }

        let (first, end) = (u64::from(first), u64::from(last) + 1);
        let capacity = self.buffer.len() as u64;
        if first < self.start || end > self.start + capacity {
            self.start = first.saturating_sub(capacity / 3);
            self.invalidate();
        }

        // Keep the valid range contiguous.
        if self.valid.is_empty() || end < self.valid.start || first > self.valid.end {
            self.valid = first..first;
        }

        if first < self.valid.start {
            self.load(first, self.valid.start)?;
            self.valid.start = first;
        }
        if end > self.valid.end {
            self.load(self.valid.end, end)?;
            self.valid.end = end;
        }

        let lo = self.offset(first);
        Ok(&self.buffer[lo..lo + span])
    }

    /// Reads sample `n`, from the buffer if it holds it.
    ///
    /// # Errors
    ///
    /// Same as [`StoreReader::read`].
    pub fn get(&self, n: SampleNumber) -> Result<T> {
        if self.epoch == self.reader.epoch() && self.valid.contains(&u64::from(n)) {
            return Ok(self.buffer[self.offset(u64::from(n))]);
        }
        self.reader.read(n)
    }

    /// Min/max over `[first, last]`, answered from the store's block index.
    ///
    /// # Errors
    ///
    /// Same as [`StoreReader::range_summary`].
    pub fn range_summary(&self, first: SampleNumber, last: SampleNumber) -> Result<Summary<T>> {
        self.reader.range_summary(first, last)
    }

    /// Forgets the buffered samples; the next update reads everything.
    pub fn invalidate(&mut self) {
        self.valid = self.start..self.start;
    }

    /// Number of samples the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Sample numbers currently held in the buffer.
    pub fn valid_range(&self) -> Range<u64> {
        self.valid.clone()
    }

    /// Reads `[from, to)` into the matching part of the buffer.
    #[allow(clippy::cast_possible_truncation)] // bounded by the store length
    fn load(&mut self, from: u64, to: u64) -> Result<()> {
        let (lo, hi) = (self.offset(from), self.offset(to));
        self.reader.read_range_into(from as SampleNumber, &mut self.buffer[lo..hi])
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)] // within the buffer
    fn offset(&self, n: u64) -> usize {
        (n - self.start) as usize
    }
}

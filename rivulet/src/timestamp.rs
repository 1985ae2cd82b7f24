//! Nearest-timestamp search over a timestamp store.
//!
//! Timestamps are `i64` milliseconds appended in non-decreasing order. Both
//! searches walk the store block by block and use the block index to skip
//! or answer whole blocks without touching their samples:
//!
//! - [`closest_at_or_before`](StoreReader::closest_at_or_before) walks
//!   backward. A block whose minimum is after `t` holds no candidate; a
//!   block whose maximum is at or before `t` answers with its last sample.
//! - [`closest_after`](StoreReader::closest_after) walks forward, skipping
//!   blocks whose maximum is at or before `t`.
//!
//! Only the block the answer lies in, and the partial block at the end of
//! the store, are scanned sample by sample. On input that is not
//! monotonic the result is some valid sample number (or `None`) and never
//! a panic.

use crate::error::Result;
use crate::index::Summary;
use crate::sample::SampleNumber;
use crate::store::StoreReader;

impl StoreReader<i64> {
    /// Largest sample number `n <= max_n` whose timestamp is `<= t`.
    ///
    /// `max_n` is clamped to the last appended sample. Returns `None` if the
    /// store is empty or every candidate is after `t`.
    ///
    /// # Errors
    ///
    /// Returns an error if a block that must be scanned cannot be read.
    pub fn closest_at_or_before(&self, t: i64, max_n: SampleNumber) -> Result<Option<SampleNumber>> {
        let Some(last) = self.last_sample() else {
            return Ok(None);
        };
        let max_n = max_n.min(last);
        let block_size = self.config().block_size;

        let mut block = max_n / block_size;
        loop {
            let start = block * block_size;
            let end = max_n.min(start.saturating_add(block_size - 1));

            if let Some(summary) = self.whole_block_summary(block, end) {
                if summary.min > t {
                    if block == 0 {
                        return Ok(None);
                    }
                    block -= 1;
                    continue;
                }
                if summary.max <= t {
                    return Ok(Some(end));
                }
            }

            let values = self.read_range(start, end)?;
            if let Some(i) = values.iter().rposition(|&ts| ts <= t) {
                return Ok(Some(start + offset(i)));
            }

            if block == 0 {
                return Ok(None);
            }
            block -= 1;
        }
    }

    /// Smallest sample number whose timestamp is `> t`.
    ///
    /// If no timestamp is after `t` the last sample number is returned.
    /// Returns `None` only for an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if a block that must be scanned cannot be read.
    pub fn closest_after(&self, t: i64) -> Result<Option<SampleNumber>> {
        let Some(last) = self.last_sample() else {
            return Ok(None);
        };
        let block_size = self.config().block_size;

        for block in 0..=last / block_size {
            let start = block * block_size;
            let end = last.min(start.saturating_add(block_size - 1));

            if self
                .whole_block_summary(block, end)
                .is_some_and(|summary| summary.max <= t)
            {
                continue;
            }

            let values = self.read_range(start, end)?;
            if let Some(i) = values.iter().position(|&ts| ts > t) {
                return Ok(Some(start + offset(i)));
            }
        }

        Ok(Some(last))
    }

    fn last_sample(&self) -> Option<SampleNumber> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        Some(SampleNumber::try_from(len - 1).unwrap_or(SampleNumber::MAX))
    }

    /// Summary of `block` if the search covers all of it and it is complete.
    fn whole_block_summary(&self, block: SampleNumber, end: SampleNumber) -> Option<Summary<i64>> {
        let block_size = self.config().block_size;
        if end != (block * block_size).saturating_add(block_size - 1) {
            return None;
        }
        self.block_summary(block as usize)
    }
}

#[inline]
fn offset(i: usize) -> SampleNumber {
    SampleNumber::try_from(i).unwrap_or(SampleNumber::MAX)
}

/// Timestamp queries over the timestamp store of a channel or session.
#[derive(Debug, Clone)]
pub struct TimestampSearch {
    reader: StoreReader<i64>,
}

impl TimestampSearch {
    /// Wraps a timestamp store reader.
    pub fn new(reader: StoreReader<i64>) -> Self {
        Self { reader }
    }

    /// See [`StoreReader::closest_at_or_before`].
    ///
    /// # Errors
    ///
    /// Returns an error if a block that must be scanned cannot be read.
    pub fn closest_at_or_before(&self, t: i64, max_n: SampleNumber) -> Result<Option<SampleNumber>> {
        self.reader.closest_at_or_before(t, max_n)
    }

    /// See [`StoreReader::closest_after`].
    ///
    /// # Errors
    ///
    /// Returns an error if a block that must be scanned cannot be read.
    pub fn closest_after(&self, t: i64) -> Result<Option<SampleNumber>> {
        self.reader.closest_after(t)
    }

    /// The underlying reader.
    pub fn reader(&self) -> &StoreReader<i64> {
        &self.reader
    }
}

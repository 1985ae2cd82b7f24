//! Per-block min/max summaries.
//!
//! Every `block_size` consecutive samples form a block. Once a block is
//! completely appended its [`Summary`] is pushed onto the [`BlockIndex`], so
//! the index only ever holds summaries of finished blocks and readers can
//! consult it without coordinating with the writer's in-progress block.
//!
//! Range queries combine whole-block summaries in O(1) per block and only
//! scan samples in the partially covered blocks at either end.

use std::ops::Range;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::sample::Sample;

/// Minimum and maximum over a run of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary<T> {
    /// Smallest sample.
    pub min: T,
    /// Largest sample.
    pub max: T,
}

impl<T: Sample> Summary<T> {
    /// Summary of a single sample.
    #[inline]
    pub fn of(value: T) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// Whether the summary covers only unordered values (NaN).
    #[inline]
    pub fn is_unordered(&self) -> bool {
        self.min.is_unordered()
    }

    /// Widens the summary to include `value`.
    ///
    /// Unordered values are skipped; a summary of unordered values only is
    /// replaced by the first ordered one.
    #[inline]
    pub fn include(&mut self, value: T) {
        if value.is_unordered() {
            return;
        }
        if self.is_unordered() {
            *self = Self::of(value);
            return;
        }
        self.min = self.min.min_of(value);
        self.max = self.max.max_of(value);
    }

    /// Combines two summaries. A summary of unordered values only is the
    /// identity.
    #[inline]
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        if other.is_unordered() {
            return self;
        }
        if self.is_unordered() {
            return other;
        }
        Self {
            min: self.min.min_of(other.min),
            max: self.max.max_of(other.max),
        }
    }

    /// Brute-force summary of a slice; `None` if the slice is empty.
    pub fn scan(values: &[T]) -> Option<Self> {
        let (&first, rest) = values.split_first()?;
        let mut summary = Self::of(first);
        for &value in rest {
            summary.include(value);
        }
        Some(summary)
    }
}

/// Merges two optional summaries.
pub(crate) fn merge_opt<T: Sample>(a: Option<Summary<T>>, b: Option<Summary<T>>) -> Option<Summary<T>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.merge(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Running summary of the block the writer is currently filling.
#[derive(Debug, Default)]
pub(crate) struct BlockAccumulator<T> {
    current: Option<Summary<T>>,
}

impl<T: Sample> BlockAccumulator<T> {
    /// Records `value`; `starts_block` resets the running summary.
    #[inline]
    pub(crate) fn record(&mut self, value: T, starts_block: bool) {
        if let (Some(summary), false) = (self.current.as_mut(), starts_block) {
            summary.include(value);
        } else {
            self.current = Some(Summary::of(value));
        }
    }

    /// Takes the finished block's summary.
    pub(crate) fn take(&mut self) -> Option<Summary<T>> {
        self.current.take()
    }

    /// Forgets any partial block.
    pub(crate) fn reset(&mut self) {
        self.current = None;
    }
}

/// Summaries of all completed blocks of a store, indexed by block number.
#[derive(Debug)]
pub(crate) struct BlockIndex<T> {
    blocks: RwLock<Vec<Summary<T>>>,
}

impl<T: Sample> BlockIndex<T> {
    pub(crate) fn new() -> Self {
        Self {
            blocks: RwLock::new(Vec::new()),
        }
    }

    /// Publishes the summary of the next completed block.
    pub(crate) fn push(&self, summary: Summary<T>) {
        self.blocks.write().push(summary);
    }

    /// Summary of block `block`, if it is complete.
    pub(crate) fn get(&self, block: usize) -> Option<Summary<T>> {
        self.blocks.read().get(block).copied()
    }

    /// Number of completed blocks.
    pub(crate) fn len(&self) -> usize {
        self.blocks.read().len()
    }

    /// Combined summary of the blocks in `range`.
    ///
    /// Returns `None` if the range is empty or reaches past the last
    /// completed block.
    pub(crate) fn combine(&self, range: Range<usize>) -> Option<Summary<T>> {
        let blocks = self.blocks.read();
        let slice = blocks.get(range)?;
        let (&first, rest) = slice.split_first()?;
        Some(rest.iter().fold(first, |acc, &s| acc.merge(s)))
    }

    /// Drops all summaries.
    pub(crate) fn clear(&self) {
        self.blocks.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan() {
        assert_eq!(Summary::<f32>::scan(&[]), None);
        assert_eq!(
            Summary::scan(&[5.0f32, 1.0, 3.0, 9.0]),
            Some(Summary { min: 1.0, max: 9.0 })
        );
    }

    #[test]
    fn test_accumulator_resets_at_block_start() {
        let mut acc = BlockAccumulator::default();
        for (i, v) in [5i64, 1, 3, 9].into_iter().enumerate() {
            acc.record(v, i == 0);
        }
        assert_eq!(acc.take(), Some(Summary { min: 1, max: 9 }));

        acc.record(2, false);
        acc.record(8, false);
        acc.record(0, true);
        acc.record(4, false);
        assert_eq!(acc.take(), Some(Summary { min: 0, max: 4 }));
        assert_eq!(acc.take(), None);
    }

    #[test]
    fn test_combine() {
        let index = BlockIndex::new();
        index.push(Summary { min: 1.0f32, max: 9.0 });
        index.push(Summary { min: 0.0, max: 8.0 });
        index.push(Summary { min: 4.0, max: 12.0 });

        assert_eq!(index.len(), 3);
        assert_eq!(index.get(1), Some(Summary { min: 0.0, max: 8.0 }));
        assert_eq!(index.get(3), None);
        assert_eq!(index.combine(0..2), Some(Summary { min: 0.0, max: 9.0 }));
        assert_eq!(index.combine(1..3), Some(Summary { min: 0.0, max: 12.0 }));
        assert_eq!(index.combine(2..2), None);
        assert_eq!(index.combine(2..4), None);

        index.clear();
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_nan_is_skipped() {
        let mut summary = Summary::of(f32::NAN);
        assert!(summary.is_unordered());
        summary.include(4.0);
        summary.include(f32::NAN);
        summary.include(-2.0);
        assert_eq!(summary, Summary { min: -2.0, max: 4.0 });

        assert_eq!(
            Summary::scan(&[f32::NAN, 1.0, f32::NAN, 3.0]),
            Some(Summary { min: 1.0, max: 3.0 })
        );
    }

    #[test]
    fn test_merge_is_independent_of_nan_position() {
        let real = Summary { min: 5.0f32, max: 5.0 };
        let nan = Summary::of(f32::NAN);
        assert_eq!(real.merge(nan), real);
        assert_eq!(nan.merge(real), real);
        assert!(nan.merge(nan).is_unordered());
    }

    #[test]
    fn test_accumulator_with_nan_at_block_start() {
        let mut acc = BlockAccumulator::default();
        acc.record(f32::NAN, true);
        acc.record(0.0, false);
        acc.record(2.0, false);
        assert_eq!(acc.take(), Some(Summary { min: 0.0, max: 2.0 }));
    }

    #[test]
    fn test_merge_opt() {
        let a = Some(Summary { min: 1i64, max: 2 });
        let b = Some(Summary { min: -1i64, max: 0 });
        assert_eq!(merge_opt(a, b), Some(Summary { min: -1, max: 2 }));
        assert_eq!(merge_opt(a, None), a);
        assert_eq!(merge_opt(None, b), b);
        assert_eq!(merge_opt::<i64>(None, None), None);
    }
}

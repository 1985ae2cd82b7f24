//! Channels: one timestamp store and N value stores in lockstep.
//!
//! A channel models one acquisition stream. Every row has one timestamp
//! and one `f32` per value store, and all stores of a channel share the
//! same sample numbers: row `n` is timestamp `n` plus value `n` of every
//! value store.
//!
//! ```text
//! <identity>-timestamps   [t0 ][t1 ][t2 ] ...
//! <identity>-value-0      [v00][v10][v20] ...
//! <identity>-value-1      [v01][v11][v21] ...
//! ```
//!
//! Within a row the timestamp is appended first and the values after it,
//! so a reader racing the writer may briefly see a store one row ahead of
//! another. [`ChannelReader::row_count`] is the minimum over all stores
//! and is therefore always safe to query up to.

use tracing::info;

use crate::config::StoreConfig;
use crate::error::{AppendError, Result};
use crate::sample::SampleNumber;
use crate::store::{Appender, Store, StoreReader};
use crate::timestamp::TimestampSearch;

/// Namespace for creating channels.
#[derive(Debug)]
pub struct Channel;

impl Channel {
    /// Creates the stores of a channel named `identity` with `value_count`
    /// value stores, all using `config`.
    ///
    /// The stores are named `<identity>-timestamps` and
    /// `<identity>-value-<i>`.
    ///
    /// # Errors
    ///
    /// Returns an error if any store cannot be created.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use rivulet::channel::Channel;
    /// use rivulet::config::StoreConfig;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut writer = Channel::create("imu", 3, StoreConfig::default())?;
    /// writer.append_row(1_700_000_000_000, &[0.1, 0.2, 9.8])?;
    ///
    /// let reader = writer.reader();
    /// assert_eq!(reader.row_count(), 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn create(identity: &str, value_count: usize, config: StoreConfig) -> Result<ChannelWriter> {
        let timestamps = Store::create(&format!("{identity}-timestamps"), config.clone())?;
        let values = (0..value_count)
            .map(|i| Store::create(&format!("{identity}-value-{i}"), config.clone()))
            .collect::<Result<Vec<_>>>()?;

        info!(channel = identity, values = value_count, "created channel");

        Ok(ChannelWriter {
            identity: identity.to_string(),
            timestamps,
            values,
        })
    }
}

/// Exclusive write handle of a channel.
#[derive(Debug)]
pub struct ChannelWriter {
    identity: String,
    timestamps: Appender<i64>,
    values: Vec<Appender<f32>>,
}

impl ChannelWriter {
    /// Returns the channel's identity.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Number of value stores.
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// Number of complete rows written.
    pub fn row_count(&self) -> u64 {
        self.values
            .iter()
            .map(Appender::len)
            .fold(self.timestamps.len(), u64::min)
    }

    fn check_width(&self, row: &[f32]) -> Result<()> {
        if row.len() != self.values.len() {
            return Err(AppendError::RowWidth {
                expected: self.values.len(),
                actual: row.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Appends one row.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::RowWidth`] if `row` does not hold exactly one
    /// value per value store, or [`AppendError::CapacityExceeded`] if the
    /// channel is full. Nothing is appended in either case.
    pub fn append_row(&mut self, timestamp: i64, row: &[f32]) -> Result<()> {
        self.check_width(row)?;
        // All stores share length and capacity, so only the first can fail.
        self.timestamps.append(timestamp)?;
        for (store, &value) in self.values.iter_mut().zip(row) {
            store.append(value)?;
        }
        Ok(())
    }

    /// Appends one block of identical rows: `timestamp` in the timestamp
    /// store and `row[i]` repeated in value store `i`.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::RowWidth`] for a row of the wrong width, or
    /// [`AppendError::Unaligned`] if the row count is not on a block
    /// boundary.
    pub fn append_constant_block(&mut self, timestamp: i64, row: &[f32]) -> Result<()> {
        self.check_width(row)?;
        self.timestamps.append_block(timestamp)?;
        for (store, &value) in self.values.iter_mut().zip(row) {
            store.append_block(value)?;
        }
        Ok(())
    }

    /// Returns a new read-only handle on this channel.
    pub fn reader(&self) -> ChannelReader {
        ChannelReader {
            timestamps: self.timestamps.reader(),
            values: self.values.iter().map(Appender::reader).collect(),
        }
    }

    /// Clears every store of the channel.
    ///
    /// # Errors
    ///
    /// Returns the first backing file error; every store is reset
    /// regardless.
    pub fn clear(&mut self) -> Result<()> {
        let mut result = self.timestamps.clear();
        for store in &mut self.values {
            let cleared = store.clear();
            if result.is_ok() {
                result = cleared;
            }
        }
        info!(channel = %self.identity, "cleared channel");
        result
    }

    /// Disposes every store of the channel.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; every store is disposed
    /// regardless.
    pub fn dispose(self) -> Result<()> {
        let mut result = self.timestamps.dispose();
        for store in self.values {
            let disposed = store.dispose();
            if result.is_ok() {
                result = disposed;
            }
        }
        info!(channel = %self.identity, "disposed channel");
        result
    }
}

/// Clonable read-only handle of a channel.
#[derive(Debug, Clone)]
pub struct ChannelReader {
    timestamps: StoreReader<i64>,
    values: Vec<StoreReader<f32>>,
}

impl ChannelReader {
    /// Number of rows readable from every store.
    pub fn row_count(&self) -> u64 {
        self.values
            .iter()
            .map(StoreReader::len)
            .fold(self.timestamps.len(), u64::min)
    }

    /// The timestamp store.
    pub fn timestamps(&self) -> &StoreReader<i64> {
        &self.timestamps
    }

    /// Value store `i`, if it exists.
    pub fn values(&self, i: usize) -> Option<&StoreReader<f32>> {
        self.values.get(i)
    }

    /// Number of value stores.
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// Timestamp search over this channel's timestamps.
    pub fn search(&self) -> TimestampSearch {
        TimestampSearch::new(self.timestamps.clone())
    }

    /// Last complete row whose timestamp is at or before `t`.
    ///
    /// # Errors
    ///
    /// Returns an error if the timestamp store cannot be read.
    pub fn row_at_or_before(&self, t: i64) -> Result<Option<SampleNumber>> {
        let rows = self.row_count();
        if rows == 0 {
            return Ok(None);
        }
        let last = SampleNumber::try_from(rows - 1).unwrap_or(SampleNumber::MAX);
        self.timestamps.closest_at_or_before(t, last)
    }

    /// Reads row `n`: its timestamp and one value per value store.
    ///
    /// # Errors
    ///
    /// Returns an error if any store cannot serve sample `n`.
    pub fn row(&self, n: SampleNumber) -> Result<(i64, Vec<f32>)> {
        let timestamp = self.timestamps.read(n)?;
        let values = self
            .values
            .iter()
            .map(|store| store.read(n))
            .collect::<Result<Vec<_>>>()?;
        Ok((timestamp, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RivuletError;
    use tempfile::{TempDir, tempdir};

    fn config(temp_dir: &TempDir) -> StoreConfig {
        StoreConfig::default()
            .with_geometry(8, 4)
            .with_cache_dir(temp_dir.path())
    }

    #[test]
    fn test_create_names_stores() {
        let temp_dir = tempdir().unwrap();
        let writer = Channel::create("imu", 2, config(&temp_dir)).unwrap();
        let reader = writer.reader();

        assert_eq!(writer.identity(), "imu");
        assert_eq!(reader.value_count(), 2);
        assert_eq!(reader.timestamps().identity(), "imu-timestamps");
        assert_eq!(reader.values(1).unwrap().identity(), "imu-value-1");
        assert!(reader.values(2).is_none());
        assert!(temp_dir.path().join("imu-value-0.bin").exists());
    }

    #[test]
    fn test_rows_stay_in_lockstep() {
        let temp_dir = tempdir().unwrap();
        let mut writer = Channel::create("imu", 2, config(&temp_dir)).unwrap();
        let reader = writer.reader();

        for i in 0..20u8 {
            writer
                .append_row(1_000 + i64::from(i), &[f32::from(i), -f32::from(i)])
                .unwrap();
        }

        assert_eq!(writer.row_count(), 20);
        assert_eq!(reader.row_count(), 20);
        assert_eq!(reader.row(13).unwrap(), (1_013, vec![13.0, -13.0]));
        assert_eq!(reader.row_at_or_before(1_005).unwrap(), Some(5));
        assert_eq!(reader.row_at_or_before(999).unwrap(), None);
        assert_eq!(reader.search().closest_after(1_005).unwrap(), Some(6));
    }

    #[test]
    fn test_row_width_is_checked() {
        let temp_dir = tempdir().unwrap();
        let mut writer = Channel::create("imu", 2, config(&temp_dir)).unwrap();

        match writer.append_row(1, &[1.0]) {
            Err(RivuletError::Append(AppendError::RowWidth { expected: 2, actual: 1 })) => {}
            other => panic!("expected row width error, got: {other:?}"),
        }
        assert_eq!(writer.row_count(), 0);
    }

    #[test]
    fn test_constant_block() {
        let temp_dir = tempdir().unwrap();
        let mut writer = Channel::create("gaps", 1, config(&temp_dir)).unwrap();
        let reader = writer.reader();

        writer.append_constant_block(500, &[0.0]).unwrap();
        writer.append_row(600, &[1.5]).unwrap();
        assert!(writer.append_constant_block(700, &[0.0]).is_err());

        assert_eq!(reader.row_count(), 5);
        assert_eq!(reader.row(3).unwrap(), (500, vec![0.0]));
        assert_eq!(reader.row(4).unwrap(), (600, vec![1.5]));
    }

    #[test]
    fn test_clear_and_dispose() {
        let temp_dir = tempdir().unwrap();
        let mut writer = Channel::create("imu", 1, config(&temp_dir)).unwrap();
        let reader = writer.reader();

        writer.append_row(1, &[1.0]).unwrap();
        writer.clear().unwrap();
        assert_eq!(reader.row_count(), 0);

        writer.dispose().unwrap();
        assert!(!temp_dir.path().join("imu-timestamps.bin").exists());
        assert!(!temp_dir.path().join("imu-value-0.bin").exists());
    }
}

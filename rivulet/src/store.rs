//! Store: the paged, append-only sample array.
//!
//! A store owns the slot sequence, the block index and the backing file of
//! one logical array of samples. It is split into two handles:
//!
//! - [`Appender`] is the single writer. It is move-only (not `Clone`), so
//!   the single-writer rule is enforced by ownership. It also owns the
//!   lifecycle operations [`Appender::clear`] and [`Appender::dispose`].
//! - [`StoreReader`] is a cheap, clonable, read-only handle. Any number of
//!   readers may query concurrently with the writer.
//!
//! # Paging
//!
//! ```text
//! slot:     0          1          2          3 (current)
//!        [on disk]  [on disk]  [resident] [resident, being written]
//!                                  ▲
//!           starting slot 3 evicted slot 1 (resident_slots = 2)
//! ```
//!
//! When the writer starts slot `s`, slot `s - resident_slots` is handed to a
//! detached eviction thread, which applies the configured
//! [`EvictionPolicy`]. Under `PersistToDisk` the slot's memory is released
//! only after its data has been written and synced; a failed write leaves
//! the slot resident.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use rivulet::config::StoreConfig;
//! use rivulet::store::Store;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = Store::<f32>::create("ch0-values", StoreConfig::default())?;
//! let reader = writer.reader();
//!
//! for i in 0..10_000u16 {
//!     writer.append(f32::from(i))?;
//! }
//!
//! let summary = reader.range_summary(100, 9_999)?;
//! assert_eq!(summary.min, 100.0);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{self, EvictionPolicy, StoreConfig};
use crate::error::{AppendError, QueryError, Result};
use crate::file::BackingFile;
use crate::index::{BlockAccumulator, BlockIndex, Summary, merge_opt};
use crate::sample::{Sample, SampleNumber};
use crate::slot::{Located, Residency, Slot};
use crate::window::ReadWindow;

/// Largest number of resident samples copied under one slot lock.
const COPY_CHUNK: usize = 16_384;

/// Shared state of one store.
///
/// Not constructed directly: [`Store::create`] returns the [`Appender`],
/// and readers are obtained from it.
#[derive(Debug)]
pub struct Store<T: Sample> {
    /// Name of the store; the backing file is `<cache_dir>/<identity>.bin`.
    identity: String,
    /// Paging geometry and eviction policy.
    config: StoreConfig,
    /// Durable tier.
    file: BackingFile,
    /// Slot sequence; slot `i` covers samples `[i * slot_size, (i + 1) * slot_size)`.
    slots: RwLock<Vec<Arc<Slot<T>>>>,
    /// Summaries of completed blocks.
    index: BlockIndex<T>,
    /// Published sample count.
    len: AtomicU64,
    /// Bumped by every clear so read windows can drop stale contents.
    epoch: AtomicU64,
    /// Set once the backing file has been removed.
    disposed: AtomicBool,
    /// In-flight eviction tracking.
    evictions: InFlight,
    /// Eviction outcome counters.
    counters: Counters,
}

/// Counts in-flight evictions so lifecycle operations can wait for quiescence.
#[derive(Debug, Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn begin(&self) {
        *self.count.lock() += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }

    fn current(&self) -> usize {
        *self.count.lock()
    }
}

#[derive(Debug, Default)]
struct Counters {
    persisted: AtomicU64,
    discarded: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time statistics of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Samples appended so far.
    pub len: u64,
    /// Completed blocks in the index.
    pub blocks: usize,
    /// Slots allocated since creation or the last clear.
    pub slots: usize,
    /// Slots currently holding their data in memory.
    pub resident_slots: usize,
    /// Evictions currently running.
    pub evictions_in_flight: usize,
    /// Slots successfully written to the backing file.
    pub slots_persisted: u64,
    /// Slots dropped under `DiscardOnEvict`.
    pub slots_discarded: u64,
    /// Evictions whose write failed; those slots stayed resident.
    pub failed_evictions: u64,
}

impl<T: Sample> Store<T> {
    /// Creates a store named `identity` and returns its writer.
    ///
    /// The backing file `<cache_dir>/<identity>.bin` is created empty,
    /// truncating anything left over from an earlier session.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or identity is invalid, or if
    /// the backing file cannot be created.
    pub fn create(identity: &str, config: StoreConfig) -> Result<Appender<T>> {
        config.validate()?;
        config::validate_identity(identity)?;

        let path = config.backing_path(identity);
        let file = BackingFile::create(&path)?;

        debug!(
            store = identity,
            kind = T::NAME,
            path = %path.display(),
            slot_size = config.slot_size,
            block_size = config.block_size,
            "created store"
        );

        let store = Arc::new(Self {
            identity: identity.to_string(),
            config,
            file,
            slots: RwLock::new(Vec::new()),
            index: BlockIndex::new(),
            len: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            evictions: InFlight::default(),
            counters: Counters::default(),
        });

        Ok(Appender {
            store,
            current: None,
            block: BlockAccumulator::default(),
            len: 0,
        })
    }

    /// Published sample count.
    #[inline]
    fn len(&self) -> u64 {
        self.len.load(Ordering::Acquire)
    }

    /// Fails once the store has been disposed.
    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(QueryError::Disposed.into());
        }
        Ok(())
    }

    /// Validates an inclusive range against the published length.
    fn check_range(&self, first: SampleNumber, last: SampleNumber) -> Result<()> {
        self.ensure_live()?;
        if first > last {
            return Err(QueryError::InvalidRange { first, last }.into());
        }
        let len = self.len();
        if u64::from(last) >= len {
            return Err(QueryError::OutOfRange {
                sample: u64::from(last),
                len,
            }
            .into());
        }
        Ok(())
    }

    /// Slot holding sample `n`.
    fn slot_of(&self, n: u64) -> Option<Arc<Slot<T>>> {
        let index = usize::try_from(n / u64::from(self.config.slot_size)).ok()?;
        self.slots.read().get(index).cloned()
    }

    /// Reads sample `n`, which must be below the published length.
    fn read(&self, n: SampleNumber) -> Result<T> {
        self.check_range(n, n)?;
        let sample = u64::from(n);
        let slot = self.slot_of(sample).ok_or(QueryError::OutOfRange {
            sample,
            len: self.len(),
        })?;

        #[allow(clippy::cast_possible_truncation)] // bounded by slot_size (u32)
        let offset = (sample % u64::from(self.config.slot_size)) as usize;
        match slot.get(offset) {
            Ok(value) => Ok(value),
            Err(Located::Disk) => self.file.read_sample(sample),
            Err(_) => Err(QueryError::Discarded {
                sample: n,
                slot: slot.index(),
            }
            .into()),
        }
    }

    /// Fills `out` with the samples starting at `first`.
    ///
    /// Resident portions are copied directly. Runs of consecutive on-disk
    /// slots are coalesced into a single file read.
    fn fill(&self, first: u64, out: &mut [T]) -> Result<()> {
        if out.is_empty() {
            return Ok(());
        }

        let slot_size = u64::from(self.config.slot_size);
        let last = first + out.len() as u64 - 1;
        let slots: Vec<Arc<Slot<T>>> = {
            let guard = self.slots.read();
            let range = usize::try_from(first / slot_size).unwrap_or(usize::MAX)
                ..usize::try_from(last / slot_size + 1).unwrap_or(usize::MAX);
            match guard.get(range) {
                Some(slots) => slots.to_vec(),
                None => {
                    return Err(QueryError::OutOfRange {
                        sample: last,
                        len: self.len(),
                    }
                    .into());
                }
            }
        };

        // (first sample, start in `out`, length) of the pending disk run.
        let mut disk_run: Option<(u64, usize, usize)> = None;
        let mut pos = 0usize;
        let mut sample = first;

        for slot in slots {
            #[allow(clippy::cast_possible_truncation)] // bounded by slot_size (u32)
            let offset = (sample % slot_size) as usize;
            let take = (out.len() - pos).min(self.config.slot_size as usize - offset);

            // Resident data is copied in chunks so the writer can take the
            // slot lock between them.
            let mut copied = 0usize;
            while copied < take {
                let at = pos + copied;
                let chunk = (take - copied).min(COPY_CHUNK);
                match slot.copy_into(offset + copied, &mut out[at..at + chunk]) {
                    Located::Memory => {
                        if let Some(run) = disk_run.take() {
                            self.read_run(run, out)?;
                        }
                        copied += chunk;
                    }
                    Located::Disk => {
                        let rest = take - copied;
                        disk_run = Some(match disk_run {
                            Some((run_first, run_pos, run_len)) => (run_first, run_pos, run_len + rest),
                            None => (sample + copied as u64, at, rest),
                        });
                        copied = take;
                    }
                    Located::Discarded => {
                        return Err(QueryError::Discarded {
                            sample: SampleNumber::try_from(sample + copied as u64)
                                .unwrap_or(SampleNumber::MAX),
                            slot: slot.index(),
                        }
                        .into());
                    }
                }
            }

            pos += take;
            sample += take as u64;
        }

        if let Some(run) = disk_run {
            self.read_run(run, out)?;
        }
        Ok(())
    }

    fn read_run(&self, (first, pos, len): (u64, usize, usize), out: &mut [T]) -> Result<()> {
        self.file.read_samples(first, &mut out[pos..pos + len])
    }

    /// Min/max over `[first, last]` via whole-block summaries plus scans of
    /// the partial blocks at either end.
    fn range_summary(&self, first: SampleNumber, last: SampleNumber) -> Result<Summary<T>> {
        self.check_range(first, last)?;

        let block_size = u64::from(self.config.block_size);
        let (first, last) = (u64::from(first), u64::from(last));
        // Blocks entirely inside the range: [full_start, full_end).
        let full_start = first.div_ceil(block_size);
        let full_end = (last + 1) / block_size;

        let summary = if full_start < full_end {
            let blocks = usize::try_from(full_start).unwrap_or(usize::MAX)
                ..usize::try_from(full_end).unwrap_or(usize::MAX);
            let middle = self.index.combine(blocks).ok_or(QueryError::OutOfRange {
                sample: last,
                len: self.len(),
            })?;

            let head = self.scan(first, full_start * block_size)?;
            let tail = self.scan(full_end * block_size, last + 1)?;
            merge_opt(merge_opt(head, Some(middle)), tail)
        } else {
            self.scan(first, last + 1)?
        };

        summary.ok_or_else(|| {
            QueryError::OutOfRange {
                sample: last,
                len: self.len(),
            }
            .into()
        })
    }

    /// Brute-force summary of `[start, end)`.
    fn scan(&self, start: u64, end: u64) -> Result<Option<Summary<T>>> {
        if start >= end {
            return Ok(None);
        }
        #[allow(clippy::cast_possible_truncation)] // at most two blocks
        let mut buf = vec![T::default(); (end - start) as usize];
        self.fill(start, &mut buf)?;
        Ok(Summary::scan(&buf))
    }

    /// Hands slot `index` to an eviction task if it is still resident.
    fn schedule_eviction(self: &Arc<Self>, index: usize) {
        let Some(slot) = self.slots.read().get(index).cloned() else {
            return;
        };
        let Some(data) = slot.begin_eviction() else {
            return;
        };

        self.evictions.begin();
        debug!(store = %self.identity, slot = index, "scheduling eviction");

        let store = Arc::clone(self);
        let task_slot = Arc::clone(&slot);
        let task_data = Arc::clone(&data);
        let spawned = thread::Builder::new()
            .name(format!("rivulet-evict-{index}"))
            .spawn(move || store.evict(&task_slot, task_data));

        if let Err(e) = spawned {
            warn!(
                store = %self.identity,
                slot = index,
                error = %e,
                "failed to spawn eviction thread, evicting inline"
            );
            self.evict(&slot, data);
        }
    }

    /// Body of an eviction task.
    fn evict(&self, slot: &Slot<T>, data: Arc<Vec<T>>) {
        let index = slot.index();
        match self.config.eviction {
            EvictionPolicy::PersistToDisk => {
                let first = index as u64 * u64::from(self.config.slot_size);
                let bytes = data.len() * T::WIDTH;
                let written = self
                    .file
                    .write_samples(first, data.as_slice())
                    .and_then(|()| self.file.sync());

                match written {
                    Ok(()) => {
                        drop(data);
                        slot.settle(Residency::OnDisk);
                        self.counters.persisted.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            store = %self.identity,
                            slot = index,
                            bytes,
                            "slot persisted"
                        );
                    }
                    Err(e) => {
                        error!(
                            store = %self.identity,
                            slot = index,
                            error = %e,
                            "eviction write failed, keeping slot resident"
                        );
                        slot.restore(data);
                        self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            EvictionPolicy::DiscardOnEvict => {
                drop(data);
                slot.settle(Residency::Discarded);
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                debug!(store = %self.identity, slot = index, "slot discarded");
            }
        }
        self.evictions.finish();
    }

    fn stats(&self) -> StoreStats {
        let slots = self.slots.read();
        StoreStats {
            len: self.len(),
            blocks: self.index.len(),
            slots: slots.len(),
            resident_slots: slots.iter().filter(|s| s.is_resident()).count(),
            evictions_in_flight: self.evictions.current(),
            slots_persisted: self.counters.persisted.load(Ordering::Relaxed),
            slots_discarded: self.counters.discarded.load(Ordering::Relaxed),
            failed_evictions: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

/// Exclusive write handle of a store.
///
/// There is exactly one `Appender` per store. It is `Send`, so the writer
/// may live on its own thread, but it is not `Clone`.
#[derive(Debug)]
pub struct Appender<T: Sample> {
    store: Arc<Store<T>>,
    /// Slot currently being filled.
    current: Option<Arc<Slot<T>>>,
    /// Running min/max of the block in progress.
    block: BlockAccumulator<T>,
    /// Writer-local sample count; mirrors the published count.
    len: u64,
}

impl<T: Sample> Appender<T> {
    /// Returns a new read-only handle on this store.
    pub fn reader(&self) -> StoreReader<T> {
        StoreReader {
            store: Arc::clone(&self.store),
        }
    }

    /// Number of samples appended so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the store's configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.store.config
    }

    fn check_capacity(&self, count: u64) -> Result<()> {
        if self.len + count > self.store.config.max_samples {
            return Err(AppendError::CapacityExceeded {
                max_samples: self.store.config.max_samples,
            }
            .into());
        }
        Ok(())
    }

    /// Returns the slot sample `n` goes into, starting a new one when `n`
    /// opens a slot.
    fn current_slot(&mut self, n: u64) -> &Slot<T> {
        let opens_slot = n % u64::from(self.store.config.slot_size) == 0;
        let slot = match self.current.take() {
            Some(slot) if !opens_slot => slot,
            _ => self.start_slot(n),
        };
        self.current.insert(slot)
    }

    /// Registers a new resident slot for sample `n` and schedules eviction
    /// of the slot that falls out of the resident set.
    fn start_slot(&self, n: u64) -> Arc<Slot<T>> {
        let slot_size = self.store.config.slot_size;
        #[allow(clippy::cast_possible_truncation)] // slot count fits usize
        let index = (n / u64::from(slot_size)) as usize;
        let slot = Arc::new(Slot::resident(index, slot_size as usize));
        self.store.slots.write().push(Arc::clone(&slot));
        debug!(store = %self.store.identity, slot = index, "started slot");

        if let Some(old) = index.checked_sub(self.store.config.resident_slots) {
            self.store.schedule_eviction(old);
        }
        slot
    }

    fn publish(&mut self, len: u64) {
        self.len = len;
        self.store.len.store(len, Ordering::Release);
    }

    /// Appends one sample.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::CapacityExceeded`] if the store is full.
    #[inline]
    pub fn append(&mut self, value: T) -> Result<()> {
        self.check_capacity(1)?;

        let n = self.len;
        let block_size = u64::from(self.store.config.block_size);
        self.current_slot(n).push(value);

        self.block.record(value, n % block_size == 0);
        if (n + 1) % block_size == 0
            && let Some(summary) = self.block.take()
        {
            self.store.index.push(summary);
        }

        self.publish(n + 1);
        Ok(())
    }

    /// Appends every value of `values` in order.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::CapacityExceeded`] if the batch does not fit;
    /// nothing is appended in that case.
    pub fn append_slice(&mut self, values: &[T]) -> Result<()> {
        self.check_capacity(values.len() as u64)?;
        for &value in values {
            self.append(value)?;
        }
        Ok(())
    }

    /// Appends one whole block of `value` in a single step.
    ///
    /// The block's summary is published directly as `min = max = value`.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Unaligned`] if the sample count is not on a
    /// block boundary, or [`AppendError::CapacityExceeded`] if the block
    /// does not fit.
    pub fn append_block(&mut self, value: T) -> Result<()> {
        let block_size = self.store.config.block_size;
        if self.len % u64::from(block_size) != 0 {
            return Err(AppendError::Unaligned {
                sample: self.len,
                block_size,
            }
            .into());
        }
        self.check_capacity(u64::from(block_size))?;

        let n = self.len;
        self.current_slot(n).push_repeated(value, block_size as usize);
        self.store.index.push(Summary::of(value));
        self.publish(n + u64::from(block_size));
        Ok(())
    }

    /// Blocks until no eviction is in flight.
    pub fn wait_for_evictions(&self) {
        self.store.evictions.wait_idle();
    }

    /// Discards all samples and truncates the backing file.
    ///
    /// Waits for in-flight evictions first. Readers must not be querying
    /// while this runs; read windows notice the clear and refill.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing file cannot be truncated. The store
    /// is reset regardless.
    pub fn clear(&mut self) -> Result<()> {
        self.store.evictions.wait_idle();

        self.store.slots.write().clear();
        self.store.index.clear();
        self.current = None;
        self.block.reset();
        self.publish(0);
        self.store.epoch.fetch_add(1, Ordering::AcqRel);

        info!(store = %self.store.identity, "cleared store");
        self.store.file.truncate()
    }

    /// Releases all memory and deletes the backing file.
    ///
    /// Waits for in-flight evictions first. Readers that outlive the store
    /// get [`QueryError::Disposed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the backing file cannot be removed.
    pub fn dispose(mut self) -> Result<()> {
        self.store.evictions.wait_idle();

        self.store.disposed.store(true, Ordering::Release);
        self.store.slots.write().clear();
        self.store.index.clear();
        self.current = None;
        self.publish(0);

        info!(store = %self.store.identity, "disposed store");
        self.store.file.remove()
    }
}

/// Clonable read-only handle of a store.
#[derive(Debug)]
pub struct StoreReader<T: Sample> {
    store: Arc<Store<T>>,
}

impl<T: Sample> Clone for StoreReader<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<T: Sample> StoreReader<T> {
    /// Creates a new read window owned by the caller.
    pub fn window(&self) -> ReadWindow<T> {
        ReadWindow::new(self.clone())
    }

    /// Number of samples readable right now.
    pub fn len(&self) -> u64 {
        self.store.len()
    }

    /// Whether the store holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads sample `n`.
    ///
    /// Waits if the sample's slot is being evicted, then serves it from
    /// memory or the backing file.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::OutOfRange`] if `n` has not been appended,
    /// [`QueryError::Discarded`] if its slot was dropped, or a backing file
    /// error if the disk read fails.
    pub fn read(&self, n: SampleNumber) -> Result<T> {
        self.store.read(n)
    }

    /// Reads the inclusive range `[first, last]`.
    ///
    /// # Errors
    ///
    /// Same as [`StoreReader::read`], plus [`QueryError::InvalidRange`] if
    /// `first > last`.
    pub fn read_range(&self, first: SampleNumber, last: SampleNumber) -> Result<Vec<T>> {
        self.store.check_range(first, last)?;
        let mut out = vec![T::default(); (last - first) as usize + 1];
        self.store.fill(u64::from(first), &mut out)?;
        Ok(out)
    }

    /// Fills `out` with the samples starting at `first`.
    ///
    /// # Errors
    ///
    /// Same as [`StoreReader::read_range`].
    pub fn read_range_into(&self, first: SampleNumber, out: &mut [T]) -> Result<()> {
        if out.is_empty() {
            return self.store.ensure_live();
        }
        let last = u64::from(first) + out.len() as u64 - 1;
        let last = SampleNumber::try_from(last).map_err(|_| QueryError::OutOfRange {
            sample: last,
            len: self.len(),
        })?;
        self.store.check_range(first, last)?;
        self.store.fill(u64::from(first), out)
    }

    /// Min/max over the inclusive range `[first, last]`.
    ///
    /// Costs O(blocks touched): fully covered blocks use their precomputed
    /// summaries and only the partial blocks at the edges are scanned.
    /// Unordered values (NaN) are left out of the result.
    ///
    /// Block summaries outlive discarded samples: under
    /// [`EvictionPolicy::DiscardOnEvict`] a range made of whole blocks still
    /// has a summary after its samples are gone. A range whose edges fall in
    /// a discarded slot needs those samples and fails.
    ///
    /// # Errors
    ///
    /// Same as [`StoreReader::read_range`].
    pub fn range_summary(&self, first: SampleNumber, last: SampleNumber) -> Result<Summary<T>> {
        self.store.range_summary(first, last)
    }

    /// Summary of block `block`, if that block is complete.
    pub fn block_summary(&self, block: usize) -> Option<Summary<T>> {
        self.store.index.get(block)
    }

    /// Blocks until no eviction is in flight.
    pub fn wait_for_evictions(&self) {
        self.store.evictions.wait_idle();
    }

    /// Returns point-in-time statistics.
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Returns the store's configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.store.config
    }

    /// Returns the store's identity.
    pub fn identity(&self) -> &str {
        &self.store.identity
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        self.store.file.path()
    }

    /// Clear counter, used by read windows to detect stale contents.
    pub(crate) fn epoch(&self) -> u64 {
        self.store.epoch.load(Ordering::Acquire)
    }

    pub(crate) fn check_range(&self, first: SampleNumber, last: SampleNumber) -> Result<()> {
        self.store.check_range(first, last)
    }
}

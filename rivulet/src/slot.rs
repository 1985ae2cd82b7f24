//! Fixed-capacity slots: the unit of memory residency and eviction.
//!
//! A store's logical sample array is cut into slots of `slot_size` samples.
//! Each slot moves through a small state machine:
//!
//! ```text
//! Resident ──begin_eviction──▶ Evicting ──persisted──▶ OnDisk
//!    ▲                            │
//!    └───────write failed─────────┤
//!                                 └──discarded──▶ Discarded
//! ```
//!
//! Readers that find a slot `Evicting` block on the slot's condition
//! variable until it settles; they never spin.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::sample::Sample;

/// Where a slot's data currently lives.
#[derive(Debug)]
pub(crate) enum Residency<T> {
    /// In memory, possibly still being appended to.
    Resident(Vec<T>),
    /// Handed to an eviction task; the data is shared with it until it
    /// settles.
    Evicting(Arc<Vec<T>>),
    /// Durably written to the backing file and released from memory.
    OnDisk,
    /// Dropped without I/O under `DiscardOnEvict`.
    Discarded,
}

/// Outcome of asking a slot for a range of its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Located {
    /// The samples were copied from memory.
    Memory,
    /// The samples must be read from the backing file.
    Disk,
    /// The samples are gone.
    Discarded,
}

/// One slot of a store.
#[derive(Debug)]
pub(crate) struct Slot<T> {
    /// Position of this slot in the store's slot sequence.
    index: usize,
    /// Residency state.
    state: Mutex<Residency<T>>,
    /// Signalled whenever the slot leaves `Evicting`.
    settled: Condvar,
}

impl<T: Sample> Slot<T> {
    /// Allocates an empty resident slot able to hold `capacity` samples.
    pub(crate) fn resident(index: usize, capacity: usize) -> Self {
        Self {
            index,
            state: Mutex::new(Residency::Resident(Vec::with_capacity(capacity))),
            settled: Condvar::new(),
        }
    }

    /// Returns the slot's index in the store.
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// Appends one value. Only the writer calls this, and only on the slot it
    /// is currently filling, which is never evicted.
    #[inline]
    pub(crate) fn push(&self, value: T) {
        let mut state = self.state.lock();
        debug_assert!(matches!(*state, Residency::Resident(_)), "append to non-resident slot");
        if let Residency::Resident(values) = &mut *state {
            values.push(value);
        }
    }

    /// Appends `count` copies of `value`.
    pub(crate) fn push_repeated(&self, value: T, count: usize) {
        let mut state = self.state.lock();
        debug_assert!(matches!(*state, Residency::Resident(_)), "append to non-resident slot");
        if let Residency::Resident(values) = &mut *state {
            values.resize(values.len() + count, value);
        }
    }

    /// Moves a resident slot into `Evicting` and returns its data for the
    /// eviction task. Returns `None` if the slot is not resident.
    pub(crate) fn begin_eviction(&self) -> Option<Arc<Vec<T>>> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, Residency::Discarded) {
            Residency::Resident(values) => {
                let shared = Arc::new(values);
                *state = Residency::Evicting(Arc::clone(&shared));
                Some(shared)
            }
            other => {
                *state = other;
                None
            }
        }
    }

    /// Settles an eviction with a final state and wakes any waiting readers.
    pub(crate) fn settle(&self, outcome: Residency<T>) {
        let mut state = self.state.lock();
        *state = outcome;
        self.settled.notify_all();
    }

    /// Puts the data of a failed eviction back in memory.
    pub(crate) fn restore(&self, data: Arc<Vec<T>>) {
        let mut state = self.state.lock();
        // Drop the state's reference first so `data` is usually unique.
        *state = Residency::Resident(Vec::new());
        let values = Arc::try_unwrap(data).unwrap_or_else(|shared| shared.as_ref().clone());
        *state = Residency::Resident(values);
        self.settled.notify_all();
    }

    /// Locks the state, waiting out any in-flight eviction.
    fn settled_state(&self) -> MutexGuard<'_, Residency<T>> {
        let mut state = self.state.lock();
        while matches!(*state, Residency::Evicting(_)) {
            self.settled.wait(&mut state);
        }
        state
    }

    /// Copies `out.len()` samples starting at `offset` if the slot is in
    /// memory; otherwise reports where they live.
    ///
    /// The slot lock is held for the whole copy and blocks the writer's
    /// `push`, so callers copy large ranges in bounded chunks.
    pub(crate) fn copy_into(&self, offset: usize, out: &mut [T]) -> Located {
        let state = self.settled_state();
        match &*state {
            Residency::Resident(values) => {
                out.copy_from_slice(&values[offset..offset + out.len()]);
                Located::Memory
            }
            Residency::OnDisk => Located::Disk,
            Residency::Evicting(_) | Residency::Discarded => Located::Discarded,
        }
    }

    /// Returns the sample at `offset` if in memory, or where it lives.
    pub(crate) fn get(&self, offset: usize) -> Result<T, Located> {
        let state = self.settled_state();
        match &*state {
            Residency::Resident(values) => Ok(values[offset]),
            Residency::OnDisk => Err(Located::Disk),
            Residency::Evicting(_) | Residency::Discarded => Err(Located::Discarded),
        }
    }

    /// Whether the slot currently holds its data in memory.
    pub(crate) fn is_resident(&self) -> bool {
        matches!(*self.state.lock(), Residency::Resident(_))
    }
}

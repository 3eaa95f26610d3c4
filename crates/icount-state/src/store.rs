//! Per-context counter store.
//!
//! Five parallel arrays indexed by context handle: one aggregate array that
//! counts every instrumented instruction, and one array per [`Category`].
//! Each category also keeps a process-wide running total.
//!
//! # Concurrency
//!
//! [`CounterStore::record`] is called from whatever application thread is
//! executing instrumented code, so several threads may bump the same slot at
//! once. Each bump is a relaxed load followed by a relaxed store, not a
//! read-modify-write: concurrent bumps of one slot can lose updates. Counts
//! are therefore approximate under contention. This is accepted measurement
//! noise; the hot path takes no locks and issues no locked instructions.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::debug;

use crate::category::{Category, CategoryFlags, ContextHandle};
use crate::memory::{CounterMemory, MemoryError};

/// Counter store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to allocate {array} counter array ({capacity} entries): {source}")]
    Allocation {
        array: &'static str,
        capacity: usize,
        #[source]
        source: MemoryError,
    },

    #[error("context handle {handle} out of range (capacity {capacity})")]
    HandleOutOfRange {
        handle: ContextHandle,
        capacity: usize,
    },
}

/// Name of the aggregate array in diagnostics.
pub const AGGREGATE_ARRAY: &str = "aggregate";

/// Handle-indexed execution counters.
pub struct CounterStore {
    aggregate: CounterMemory,
    categories: [CounterMemory; Category::COUNT],
    totals: [AtomicU64; Category::COUNT],
    capacity: usize,
}

impl CounterStore {
    /// Allocate five zeroed arrays of `capacity` counters each.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Allocation`] naming the first array that could
    /// not be mapped. Arrays mapped before the failure are released.
    pub fn allocate(capacity: usize) -> Result<Self, StoreError> {
        let alloc = |array: &'static str| {
            CounterMemory::new(capacity).map_err(|source| StoreError::Allocation {
                array,
                capacity,
                source,
            })
        };

        let aggregate = alloc(AGGREGATE_ARRAY)?;
        let categories = [
            alloc(Category::MemoryLoad.name())?,
            alloc(Category::MemoryStore.name())?,
            alloc(Category::ConditionalBranch.name())?,
            alloc(Category::UnconditionalBranch.name())?,
        ];
        debug!(
            capacity,
            bytes_per_array = capacity * size_of::<u64>(),
            "counter arrays allocated"
        );

        Ok(Self {
            aggregate,
            categories,
            totals: Default::default(),
            capacity,
        })
    }

    /// Number of handles each array can hold.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    fn bump(slot: &AtomicU64) {
        slot.store(slot.load(Ordering::Relaxed) + 1, Ordering::Relaxed);
    }

    /// Count one execution of an instruction with `flags` under `handle`.
    ///
    /// The aggregate counter is always bumped; each flagged category bumps its
    /// own counter and running total.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not below [`capacity`](Self::capacity).
    #[inline]
    pub fn record(&self, handle: ContextHandle, flags: CategoryFlags) {
        let idx = handle as usize;
        Self::bump(&self.aggregate.counters()[idx]);
        for category in Category::ALL {
            if flags.contains(category) {
                Self::bump(&self.categories[category.index()].counters()[idx]);
                Self::bump(&self.totals[category.index()]);
            }
        }
    }

    /// Like [`record`](Self::record) but without any bounds check.
    ///
    /// # Safety
    ///
    /// `handle` must be below [`capacity`](Self::capacity). Handles come from
    /// the same context service that sized the store, so the instrumentation
    /// hot path relies on this instead of checking every call.
    #[inline]
    pub unsafe fn record_unchecked(&self, handle: ContextHandle, flags: CategoryFlags) {
        let idx = handle as usize;
        debug_assert!(idx < self.capacity, "context handle {handle} out of range");
        unsafe {
            Self::bump(self.aggregate.counters().get_unchecked(idx));
            for category in Category::ALL {
                if flags.contains(category) {
                    let counters = self.categories[category.index()].counters();
                    Self::bump(counters.get_unchecked(idx));
                    Self::bump(&self.totals[category.index()]);
                }
            }
        }
    }

    /// Like [`record`](Self::record) but rejects out-of-range handles.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::HandleOutOfRange`] without touching any counter.
    pub fn try_record(
        &self,
        handle: ContextHandle,
        flags: CategoryFlags,
    ) -> Result<(), StoreError> {
        if handle as usize >= self.capacity {
            return Err(StoreError::HandleOutOfRange {
                handle,
                capacity: self.capacity,
            });
        }
        self.record(handle, flags);
        Ok(())
    }

    /// Counter array for one category.
    #[must_use]
    pub const fn counts(&self, category: Category) -> &[AtomicU64] {
        self.categories[category.index()].counters()
    }

    /// Count for `category` under `handle` (0 when out of range).
    #[must_use]
    pub fn count(&self, category: Category, handle: ContextHandle) -> u64 {
        self.counts(category)
            .get(handle as usize)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Aggregate count of all instrumented instructions under `handle`.
    #[must_use]
    pub fn aggregate(&self, handle: ContextHandle) -> u64 {
        self.aggregate
            .counters()
            .get(handle as usize)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Running total for `category`.
    #[must_use]
    pub fn total(&self, category: Category) -> u64 {
        self.totals[category.index()].load(Ordering::Relaxed)
    }

    /// Counts for `category` over handles `[0, max_handle)`, clamped to capacity.
    pub fn scan(&self, category: Category, max_handle: usize) -> impl Iterator<Item = u64> + '_ {
        let end = max_handle.min(self.capacity);
        self.counts(category)[..end]
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
    }

    /// Number of handles below `max_handle` that executed at least one
    /// instrumented instruction.
    #[must_use]
    pub fn active_contexts(&self, max_handle: usize) -> usize {
        let end = max_handle.min(self.capacity);
        self.aggregate.counters()[..end]
            .iter()
            .filter(|c| c.load(Ordering::Relaxed) > 0)
            .count()
    }

    /// Release all arrays.
    ///
    /// Equivalent to dropping the store; spelled out for call sites that
    /// want the teardown point visible.
    pub fn release(self) {
        debug!(capacity = self.capacity, "counter arrays released");
    }
}

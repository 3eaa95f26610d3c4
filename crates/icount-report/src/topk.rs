//! Bounded top-K selection over a handle-indexed count array.
//!
//! Keeps at most `limit` candidates in a min-heap whose root is the weakest
//! entry, so each scanned count is compared against a single value and the
//! full population is never sorted.
//!
//! Ordering between candidates: higher count is stronger; among equal counts
//! the lower handle (scanned earlier) is stronger. A new count only displaces
//! the weakest entry when it is strictly greater, so equal counts never
//! displace each other and the earliest handle wins ties at the boundary.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use icount_state::ContextHandle;

/// Number of contexts reported per category.
pub const DEFAULT_TOP_N: usize = 10;

/// One reported context and its count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedContext {
    pub handle: ContextHandle,
    pub count: u64,
}

/// Heap entry ordered by strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate(RankedContext);

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .count
            .cmp(&other.0.count)
            .then_with(|| other.0.handle.cmp(&self.0.handle))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reusable top-K working set.
///
/// Storage is reused by every [`scan`](TopK::scan). Up to [`DEFAULT_TOP_N`]
/// entries are reserved up front; larger limits grow on demand, so the limit
/// itself never drives an allocation.
#[derive(Debug)]
pub struct TopK {
    limit: usize,
    heap: BinaryHeap<Reverse<Candidate>>,
    ranked: Vec<RankedContext>,
}

impl TopK {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            heap: BinaryHeap::with_capacity(limit.min(DEFAULT_TOP_N)),
            ranked: Vec::with_capacity(limit.min(DEFAULT_TOP_N)),
        }
    }

    /// Maximum number of entries kept.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Drop all candidates and the last ranking.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.ranked.clear();
    }

    /// Lowest count currently held, once the working set is full.
    #[must_use]
    pub fn threshold(&self) -> Option<u64> {
        if self.heap.len() < self.limit {
            return None;
        }
        self.heap.peek().map(|Reverse(c)| c.0.count)
    }

    /// Offer one scanned entry. Returns true if it entered the working set.
    ///
    /// Entries must be offered in ascending handle order for the tie-break to
    /// hold. Zero counts are never kept.
    pub fn offer(&mut self, handle: ContextHandle, count: u64) -> bool {
        if count == 0 || self.limit == 0 {
            return false;
        }
        let candidate = Candidate(RankedContext { handle, count });
        if self.heap.len() < self.limit {
            self.heap.push(Reverse(candidate));
            return true;
        }
        match self.heap.peek_mut() {
            Some(mut weakest) if count > weakest.0.0.count => {
                *weakest = Reverse(candidate);
                true
            }
            _ => false,
        }
    }

    /// Select the strongest entries from `counts`, where the i-th item is the
    /// count of handle `i`, and return them in descending order.
    pub fn scan<I>(&mut self, counts: I) -> &[RankedContext]
    where
        I: IntoIterator<Item = u64>,
    {
        self.clear();
        for (handle, count) in (0..).zip(counts) {
            self.offer(handle, count);
        }
        self.rank()
    }

    /// Move the working set into descending order and return it.
    ///
    /// Ties on count are ordered by ascending handle.
    pub fn rank(&mut self) -> &[RankedContext] {
        self.ranked.clear();
        let drained = self.heap.drain().map(|Reverse(Candidate(entry))| entry);
        self.ranked.extend(drained);
        self.ranked.sort_by(descending);
        &self.ranked
    }

    /// Result of the last [`rank`](Self::rank) or [`scan`](Self::scan).
    #[must_use]
    pub fn ranked(&self) -> &[RankedContext] {
        &self.ranked
    }
}

/// Report order: count descending, then handle ascending.
fn descending(a: &RankedContext, b: &RankedContext) -> Ordering {
    b.count.cmp(&a.count).then(a.handle.cmp(&b.handle))
}

impl Default for TopK {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_N)
    }
}

//! Per-calling-context execution counters.
//!
//! This crate provides the [`CounterStore`]: five flat, handle-indexed counter
//! arrays (one aggregate plus one per [`Category`]) that the instrumentation
//! hot path bumps once per executed instruction.
//!
//! ```ignore
//! use icount_state::{Category, CategoryFlags, CounterStore};
//!
//! let store = CounterStore::allocate(1 << 20)?;
//! store.record(42, CategoryFlags::LOAD | CategoryFlags::STORE);
//! assert_eq!(store.total(Category::MemoryLoad), 1);
//! ```

mod category;
mod memory;
mod store;

pub use category::{Category, CategoryFlags, ContextHandle};
pub use memory::{CounterMemory, GUARD_SIZE, MemoryError};
pub use store::{AGGREGATE_ARRAY, CounterStore, StoreError};

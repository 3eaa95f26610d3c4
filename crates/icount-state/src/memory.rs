//! Guarded counter arrays backed by anonymous mmap.
//!
//! Each array is laid out as `[GUARD][COUNTERS][GUARD]` with the guard pages
//! protected as `PROT_NONE`, so a handle running past either end of an array
//! faults at the OS level instead of landing in a neighbouring array.

use nix::sys::mman::{MapFlags, ProtFlags, mmap_anonymous, mprotect, munmap};
use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::atomic::AtomicU64;
use thiserror::Error;

/// Guard page size (16KB, must be a multiple of the page size).
pub const GUARD_SIZE: usize = 1 << 14;

const COUNTER_BYTES: usize = size_of::<AtomicU64>();

/// Memory allocation error.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("mmap failed: {0}")]
    MmapFailed(#[from] nix::Error),

    #[error("invalid counter array length: {0}")]
    InvalidLength(usize),
}

/// Zero-initialized array of `u64` counters with guard pages.
///
/// The pages come straight from an anonymous private mapping, so the counters
/// start at zero and untouched ranges never get backed by physical memory.
pub struct CounterMemory {
    /// Pointer to the start of the entire region (including first guard).
    region: NonNull<c_void>,
    /// Total size including both guard regions.
    total_size: usize,
    /// Number of counters.
    len: usize,
}

impl CounterMemory {
    /// Map a new array of `len` counters.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` is zero, the byte size overflows, or mmap fails.
    pub fn new(len: usize) -> Result<Self, MemoryError> {
        if len == 0 {
            return Err(MemoryError::InvalidLength(len));
        }

        let counter_bytes = len
            .checked_mul(COUNTER_BYTES)
            .and_then(|bytes| bytes.checked_next_multiple_of(GUARD_SIZE))
            .ok_or(MemoryError::InvalidLength(len))?;
        let total_size = counter_bytes
            .checked_add(2 * GUARD_SIZE)
            .ok_or(MemoryError::InvalidLength(len))?;
        let total_size_nz = NonZeroUsize::new(total_size).ok_or(MemoryError::InvalidLength(len))?;

        // Reserve the whole region as PROT_NONE
        let region = unsafe {
            mmap_anonymous(
                None,
                total_size_nz,
                ProtFlags::PROT_NONE,
                MapFlags::MAP_PRIVATE | MapFlags::MAP_NORESERVE,
            )?
        };

        // Open up the counters between the guards
        let counters_start = unsafe {
            NonNull::new_unchecked(
                region
                    .as_ptr()
                    .cast::<u8>()
                    .add(GUARD_SIZE)
                    .cast::<c_void>(),
            )
        };
        let protected = unsafe {
            mprotect(
                counters_start,
                counter_bytes,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            )
        };
        if let Err(e) = protected {
            unsafe {
                let _ = munmap(region, total_size);
            }
            return Err(MemoryError::MmapFailed(e));
        }

        Ok(Self {
            region,
            total_size,
            len,
        })
    }

    /// Returns pointer to the first counter (after the leading guard).
    ///
    /// The mapping is page-aligned and `GUARD_SIZE` is a multiple of the page
    /// size, so the counters start on an 8-byte boundary.
    #[allow(clippy::cast_ptr_alignment)]
    const fn as_ptr(&self) -> *const AtomicU64 {
        unsafe {
            self.region
                .as_ptr()
                .cast::<u8>()
                .add(GUARD_SIZE)
                .cast::<AtomicU64>()
        }
    }

    /// Number of counters in the array.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Always false; zero-length arrays are rejected at construction.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The counters as a shared atomic slice.
    #[must_use]
    pub const fn counters(&self) -> &[AtomicU64] {
        // SAFETY: the range is mapped read/write for the lifetime of `self`,
        // zero bytes are a valid `AtomicU64`, and all mutation goes through
        // the atomics.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len) }
    }
}

impl Drop for CounterMemory {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.region, self.total_size);
        }
    }
}

// The mapping is owned exclusively and only ever accessed through atomics.
unsafe impl Send for CounterMemory {}
unsafe impl Sync for CounterMemory {}

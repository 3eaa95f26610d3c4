//! Calling-context service seam.

use icount_state::ContextHandle;

/// Slot of an instrumented instruction within its basic block.
pub type SiteSlot = i32;

/// Issues context handles for the running call path.
///
/// Implemented by the calling-context service that owns the call-path tree.
/// `current_handle` runs on the instrumentation hot path, on every
/// application thread, so implementations must be cheap and thread-safe.
pub trait ContextProvider {
    /// Per-thread state the service needs to locate the current call path.
    type Thread: ?Sized;

    /// Handle of the calling context for the instruction at `slot`.
    fn current_handle(&self, thread: &Self::Thread, slot: SiteSlot) -> ContextHandle;

    /// Exclusive upper bound on handles issued so far.
    fn max_handle(&self) -> ContextHandle;
}

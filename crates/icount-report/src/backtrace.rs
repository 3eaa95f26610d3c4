//! Backtrace rendering seam.
//!
//! The calling-context service owns the call-path tree; the reporter only
//! asks it to render one handle at a time.

use icount_state::ContextHandle;

/// Maximum number of frames printed per reported context.
pub const DEFAULT_MAX_DEPTH: u32 = 10;

/// How much of a call path to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacktraceRequest {
    /// Maximum number of frames.
    pub max_depth: u32,
    /// Include the frame of the instruction itself.
    pub include_own_frame: bool,
    /// Include the caller frames above it.
    pub include_caller_frames: bool,
}

impl BacktraceRequest {
    /// Full backtrace bounded to `max_depth` frames.
    #[must_use]
    pub const fn with_depth(max_depth: u32) -> Self {
        Self {
            max_depth,
            include_own_frame: true,
            include_caller_frames: true,
        }
    }
}

impl Default for BacktraceRequest {
    fn default() -> Self {
        Self::with_depth(DEFAULT_MAX_DEPTH)
    }
}

/// Renders a context handle as a human-readable call path, innermost first.
pub trait BacktraceRenderer {
    fn render(&self, handle: ContextHandle, request: BacktraceRequest) -> String;
}

impl<R: BacktraceRenderer + ?Sized> BacktraceRenderer for Box<R> {
    fn render(&self, handle: ContextHandle, request: BacktraceRequest) -> String {
        (**self).render(handle, request)
    }
}

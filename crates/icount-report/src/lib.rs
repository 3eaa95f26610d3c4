//! Exit-time top-K reporting over per-context counters.
//!
//! For each instruction category the [`Reporter`] scans the counter array
//! once, keeps the ten strongest contexts in a bounded heap ([`TopK`]) and
//! writes them in descending order with a backtrace rendered by the
//! calling-context service ([`BacktraceRenderer`]).

mod backtrace;
mod report;
mod topk;

pub use backtrace::{BacktraceRenderer, BacktraceRequest, DEFAULT_MAX_DEPTH};
pub use report::{CategorySection, CounterSource, ReportError, Reporter, Result, SEPARATOR};
pub use topk::{DEFAULT_TOP_N, RankedContext, TopK};

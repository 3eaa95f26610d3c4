//! Per-calling-context instruction counting.
//!
//! A [`Client`] counts every execution of an instrumented instruction under
//! the calling context it ran in, split into memory loads, memory stores,
//! conditional branches and unconditional branches. At exit it writes the ten
//! hottest contexts per category, with their backtraces, to
//! `<client>.<pid>.out`.
//!
//! Calling contexts come from a [`ContextProvider`]; backtraces from a
//! [`BacktraceRenderer`]. Native hosts use the C ABI in [`ffi`].

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod ffi;
pub mod metrics;
pub mod sink;

pub use client::{Client, ExitSummary, InstrumentedSite};
pub use config::{ClientConfig, ClientOptions, DEFAULT_CLIENT_NAME, DEFAULT_HANDLE_CAPACITY};
pub use context::{ContextProvider, SiteSlot};
pub use error::{Error, Result};
pub use icount_report::{
    BacktraceRenderer, BacktraceRequest, CategorySection, DEFAULT_MAX_DEPTH, DEFAULT_TOP_N,
    RankedContext,
};
pub use icount_state::{Category, CategoryFlags, ContextHandle, CounterStore};
pub use sink::ReportSink;

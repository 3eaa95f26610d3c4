//! Text report writer.
//!
//! One section per category, in [`Category::ALL`] order:
//!
//! ```text
//! MEMORY LOAD : 16
//! [NO. 1]Ins Call times 9
//! =====...=====
//! <backtrace>
//! =====...=====
//!
//!
//! ```

use std::io::Write;

use icount_state::{Category, CounterStore};
use thiserror::Error;
use tracing::debug;

use crate::backtrace::{BacktraceRenderer, BacktraceRequest};
use crate::topk::{DEFAULT_TOP_N, RankedContext, TopK};

/// Line framing each rendered backtrace.
pub const SEPARATOR: &str =
    "=============================================================================================";

/// Report error.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;

/// Read side of the counters, as seen by the reporter.
pub trait CounterSource {
    /// Running total for `category`.
    fn total(&self, category: Category) -> u64;

    /// Counts for `category`, item `i` being handle `i`, over `[0, max_handle)`.
    fn scan(&self, category: Category, max_handle: usize) -> impl Iterator<Item = u64> + '_;
}

impl CounterSource for CounterStore {
    fn total(&self, category: Category) -> u64 {
        Self::total(self, category)
    }

    fn scan(&self, category: Category, max_handle: usize) -> impl Iterator<Item = u64> + '_ {
        Self::scan(self, category, max_handle)
    }
}

/// What one category section contained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySection {
    pub category: Category,
    pub total: u64,
    pub ranked: Vec<RankedContext>,
}

/// Writes top-K sections with rendered backtraces.
pub struct Reporter<'r, R: ?Sized> {
    renderer: &'r R,
    request: BacktraceRequest,
    top: TopK,
}

impl<'r, R: BacktraceRenderer + ?Sized> Reporter<'r, R> {
    /// Reporter with the default limits (top 10, 10 frames).
    pub fn new(renderer: &'r R) -> Self {
        Self::with_limits(renderer, DEFAULT_TOP_N, BacktraceRequest::default())
    }

    pub fn with_limits(renderer: &'r R, top_n: usize, request: BacktraceRequest) -> Self {
        Self {
            renderer,
            request,
            top: TopK::new(top_n),
        }
    }

    /// Write one category section.
    ///
    /// `counts` yields the count of handle `i` as its i-th item.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `out` fails.
    pub fn write_section<W, I>(
        &mut self,
        out: &mut W,
        category: Category,
        total: u64,
        counts: I,
    ) -> Result<CategorySection>
    where
        W: Write + ?Sized,
        I: IntoIterator<Item = u64>,
    {
        writeln!(out, "{} : {}", category.label(), total)?;

        let ranked = self.top.scan(counts);
        for (rank, entry) in ranked.iter().enumerate() {
            writeln!(out, "[NO. {}]Ins Call times {}", rank + 1, entry.count)?;
            writeln!(out, "{SEPARATOR}")?;
            let trace = self.renderer.render(entry.handle, self.request);
            out.write_all(trace.as_bytes())?;
            if !trace.is_empty() && !trace.ends_with('\n') {
                writeln!(out)?;
            }
            writeln!(out, "{SEPARATOR}")?;
            writeln!(out)?;
            writeln!(out)?;
        }

        debug!(%category, total, ranked = ranked.len(), "section written");
        Ok(CategorySection {
            category,
            total,
            ranked: ranked.to_vec(),
        })
    }

    /// Write all four sections from `source`, scanning handles `[0, max_handle)`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `out` fails.
    pub fn write_report<W, S>(
        &mut self,
        out: &mut W,
        source: &S,
        max_handle: usize,
    ) -> Result<Vec<CategorySection>>
    where
        W: Write + ?Sized,
        S: CounterSource + ?Sized,
    {
        let mut sections = Vec::with_capacity(Category::COUNT);
        for category in Category::ALL {
            let section = self.write_section(
                out,
                category,
                source.total(category),
                source.scan(category, max_handle),
            )?;
            sections.push(section);
        }
        Ok(sections)
    }
}

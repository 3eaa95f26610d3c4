//! Client lifecycle: init, per-instruction counting, exit-time report.

use std::path::PathBuf;
use std::time::Instant;

use icount_report::{
    BacktraceRenderer, BacktraceRequest, CategorySection, RankedContext, Reporter,
};
use icount_state::{Category, CategoryFlags, CounterStore};
use tracing::{debug, info, info_span, warn};

use crate::config::ClientConfig;
use crate::context::{ContextProvider, SiteSlot};
use crate::error::Result;
use crate::metrics;
use crate::sink::ReportSink;

/// An instrumented static instruction.
///
/// Created once at transformation time; its flags never change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentedSite {
    pub slot: SiteSlot,
    pub flags: CategoryFlags,
}

/// What the exit-time report contained.
#[derive(Debug, Clone)]
pub struct ExitSummary {
    /// Report file.
    pub path: PathBuf,
    /// Handle bound the report scanned, after clamping to capacity.
    pub max_handle: usize,
    /// One section per category, in report order.
    pub sections: Vec<CategorySection>,
}

impl ExitSummary {
    #[must_use]
    pub fn total(&self, category: Category) -> u64 {
        self.section(category).map_or(0, |s| s.total)
    }

    #[must_use]
    pub fn reported(&self, category: Category) -> &[RankedContext] {
        self.section(category)
            .map(|s| s.ranked.as_slice())
            .unwrap_or_default()
    }

    fn section(&self, category: Category) -> Option<&CategorySection> {
        self.sections.iter().find(|s| s.category == category)
    }
}

/// Instruction-count client bound to a calling-context service.
pub struct Client<P> {
    config: ClientConfig,
    provider: P,
    store: CounterStore,
    sink: ReportSink,
}

impl<P: ContextProvider + BacktraceRenderer> Client<P> {
    /// Open the report file, then allocate the counter arrays.
    ///
    /// # Errors
    ///
    /// Fails if the report file cannot be created or any counter array
    /// cannot be allocated.
    pub fn init(config: ClientConfig, provider: P) -> Result<Self> {
        let sink = ReportSink::create(&config.output_dir, &config.client_name)?;
        let store = CounterStore::allocate(config.capacity)?;
        debug!(
            capacity = config.capacity,
            top_n = config.top_n,
            max_depth = config.max_depth,
            "client initialized"
        );
        Ok(Self {
            config,
            provider,
            store,
            sink,
        })
    }

    /// Register a static instruction at `slot` with its category flags.
    #[must_use]
    pub const fn instrument(&self, slot: SiteSlot, flags: CategoryFlags) -> InstrumentedSite {
        InstrumentedSite { slot, flags }
    }

    /// Count one dynamic execution of `site` on `thread`.
    ///
    /// # Panics
    ///
    /// Panics if the provider returns a handle at or beyond capacity.
    #[inline]
    pub fn on_execute(&self, thread: &P::Thread, site: InstrumentedSite) {
        let handle = self.provider.current_handle(thread, site.slot);
        self.store.record(handle, site.flags);
    }

    /// [`on_execute`](Self::on_execute) without the bounds check.
    ///
    /// # Safety
    ///
    /// The provider must only issue handles below the configured capacity.
    #[inline]
    pub unsafe fn on_execute_unchecked(&self, thread: &P::Thread, site: InstrumentedSite) {
        let handle = self.provider.current_handle(thread, site.slot);
        unsafe { self.store.record_unchecked(handle, site.flags) };
    }

    /// [`on_execute`](Self::on_execute) that reports out-of-range handles.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::HandleOutOfRange`](icount_state::StoreError)
    /// without counting anything.
    pub fn try_on_execute(&self, thread: &P::Thread, site: InstrumentedSite) -> Result<()> {
        let handle = self.provider.current_handle(thread, site.slot);
        self.store.try_record(handle, site.flags)?;
        Ok(())
    }

    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    #[must_use]
    pub const fn store(&self) -> &CounterStore {
        &self.store
    }

    /// Write the report, close the file and release the counters.
    ///
    /// # Errors
    ///
    /// Fails if the report cannot be written or flushed.
    pub fn exit(self) -> Result<ExitSummary> {
        let Self {
            config,
            provider,
            store,
            mut sink,
        } = self;

        let span = info_span!("report", client = %config.client_name);
        let _enter = span.enter();
        let started = Instant::now();

        let issued = provider.max_handle() as usize;
        let max_handle = if issued > store.capacity() {
            warn!(
                max_handle = issued,
                capacity = store.capacity(),
                "context handles exceed counter capacity, clamping"
            );
            store.capacity()
        } else {
            issued
        };

        let mut reporter = Reporter::with_limits(
            &provider,
            config.top_n,
            BacktraceRequest::with_depth(config.max_depth),
        );
        let sections = reporter.write_report(sink.writer(), &store, max_handle)?;
        let path = sink.finish()?;

        let contexts = store.active_contexts(max_handle);
        metrics::record_exit(&sections, contexts, started.elapsed());
        info!(path = %path.display(), contexts, "report written");

        store.release();
        Ok(ExitSummary {
            path,
            max_handle,
            sections,
        })
    }
}

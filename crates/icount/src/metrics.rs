//! Exit-time metrics via the `metrics` facade.
//!
//! Nothing is exported unless the host installs a recorder.

use std::time::Duration;

use icount_report::CategorySection;
use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};

/// Register metric descriptions. Call once at startup.
pub fn init() {
    describe_counter!(
        "icount_instructions_total",
        Unit::Count,
        "Instrumented instructions executed, per category"
    );
    describe_gauge!(
        "icount_contexts",
        Unit::Count,
        "Calling contexts that executed at least one instrumented instruction"
    );
    describe_histogram!(
        "icount_report_duration_seconds",
        Unit::Seconds,
        "Time spent ranking contexts and writing the report"
    );
}

/// Record the totals and timing of one exit-time report.
#[allow(clippy::cast_precision_loss)]
pub fn record_exit(sections: &[CategorySection], contexts: usize, elapsed: Duration) {
    for section in sections {
        let labels = [("category", section.category.name().to_string())];
        counter!("icount_instructions_total", &labels).absolute(section.total);
    }
    gauge!("icount_contexts").set(contexts as f64);
    histogram!("icount_report_duration_seconds").record(elapsed.as_secs_f64());
}

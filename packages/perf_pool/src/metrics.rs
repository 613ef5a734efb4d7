//! Metrics for the pool workers.
//!
//! The events are per-thread instances observed only on worker threads.

use nm::{Event, Magnitude};

/// Histogram buckets for dispatch delay in milliseconds.
///
/// The dispatch delay is the time between a unit of work being submitted and a worker picking it
/// up. With idle workers this is well below a millisecond.
const DISPATCH_DELAY_MS_BUCKETS: &[Magnitude] = &[0, 1, 2, 5, 10, 20, 50, 100, 200, 500, 1000];

/// Histogram buckets for profiled execution time in milliseconds.
const EXECUTION_TIME_MS_BUCKETS: &[Magnitude] = &[0, 1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000];

thread_local! {
    /// Delay between submission of a unit of work and a worker starting to execute it.
    pub(crate) static DISPATCH_DELAY_MS: Event = Event::builder()
        .name("perf_pool_dispatch_delay_ms")
        .histogram(DISPATCH_DELAY_MS_BUCKETS)
        .build();

    /// Duration of one profiled execution, including counter reset and read.
    pub(crate) static EXECUTION_TIME_MS: Event = Event::builder()
        .name("perf_pool_execution_time_ms")
        .histogram(EXECUTION_TIME_MS_BUCKETS)
        .build();

    /// Units of work that failed, panicked or could not be profiled.
    pub(crate) static WORK_FAILURES: Event = Event::builder()
        .name("perf_pool_work_failures")
        .build();
}

//! Processor-pinned worker pool that wraps every unit of work in a tracing span annotated with
//! performance counter readings.
//!
//! A [`Manager`] owns one worker thread per processor. Each worker pins itself to its processor,
//! builds one [`Profiler`] for itself and then executes units of work ([`Poolable`]) taken from
//! shared channels. Around each unit of work the worker starts a span through the configured
//! [`Tracer`] and lets the profiler reset its counters before the work and attach the readings to
//! the span afterwards. The readings therefore cover exactly one execution.
//!
//! # Quick start
//!
//! ```
//! use perf_pool::{Context, Manager, Poolable};
//!
//! let manager = Manager::new();
//! manager.start().unwrap();
//!
//! let pooled = manager.pool(Poolable::new(|_cx| {
//!     let leading_zeros: u32 = (1..10_000_u64).map(u64::leading_zeros).sum();
//!     assert!(leading_zeros > 0);
//!     Ok(())
//! }));
//!
//! pooled.call(&Context::new()).unwrap();
//! ```
//!
//! # Profilers
//!
//! - [`NoopProfilerBuilder`] (default) measures nothing.
//! - [`HardwareProfilerBuilder`] attaches the generalized hardware counters (cycles,
//!   instructions, cache and branch statistics) the processor supports.
//! - [`CounterGroupProfilerBuilder`] attaches an arbitrary list of hardware, software, tracepoint
//!   or raw events under caller-chosen attribute names.
//!
//! Counters are read through Linux `perf_event_open(2)`. Depending on
//! `/proc/sys/kernel/perf_event_paranoid`, opening them may require elevated privileges; the
//! failure then surfaces from [`Manager::start()`].
//!
//! # Tracers
//!
//! Profilers only touch counters when the span is recording. The default [`NoopTracer`] never
//! records, so the pool then adds no profiling overhead. [`OtelTracer`] bridges to an
//! OpenTelemetry tracer.
//!
//! # Synchronous and asynchronous dispatch
//!
//! By default the adapter returned by [`Manager::pool()`] blocks until a worker has executed the
//! unit of work and returns its outcome. With [`ManagerBuilder::asynchronous()`] the adapter only
//! queues the work; failures are then logged and counted in metrics.
//!
//! # Metrics
//!
//! Workers record the following `nm` events:
//!
//! - `perf_pool_dispatch_delay_ms`: time from submission to a worker picking up the work.
//! - `perf_pool_execution_time_ms`: duration of each profiled execution.
//! - `perf_pool_work_failures`: units of work that failed, panicked or could not be profiled.

mod affinity;
mod counters;
mod dispatch;
mod error;
#[cfg(test)]
mod fake;
mod manager;
mod metrics;
mod otel;
mod pal;
mod poolable;
mod primitive_types;
mod profiler;
mod profilers;
mod tracer;
mod worker;

pub use counters::{
    CounterGroup, EventDescriptor, HardwareCounters, HardwareEvent, HardwareProfile,
    SoftwareEvent,
};
pub use error::*;
pub use manager::*;
pub use otel::*;
pub use poolable::*;
pub use primitive_types::*;
pub use profiler::*;
pub use profilers::*;
pub use tracer::*;

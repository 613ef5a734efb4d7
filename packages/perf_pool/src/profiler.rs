use std::fmt::Debug;
use std::sync::Arc;

use crate::{Context, CounterError, OsThreadId, Poolable, ProcessorId, ProfileError, Span};

/// Wraps the execution of a unit of work, annotating its span with measurements taken only
/// during that execution.
///
/// Each worker owns exactly one profiler, built by a [`ProfilerBuilder`] once the worker has
/// pinned itself to its processor. A profiler is only ever used from that worker's thread.
pub trait Profiler: Send {
    /// Executes `work` and attaches the measurements to `span`.
    ///
    /// If `span` is not recording events, the work must still be executed but no attributes may
    /// be written.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Work`] if the unit of work failed and profiling did not, and one
    /// of the counter variants if profiling failed.
    fn profile(
        &mut self,
        cx: &Context,
        span: &mut dyn Span,
        work: &Poolable,
    ) -> Result<(), ProfileError>;
}

/// Creates one [`Profiler`] per worker.
///
/// The builder is shared by all workers of a [`Manager`][crate::Manager] and called exactly once
/// by each of them, on the worker thread, after the thread has been pinned.
pub trait ProfilerBuilder: Debug + Send + Sync {
    /// Creates a profiler measuring the given thread on the given processor.
    ///
    /// # Errors
    ///
    /// Returns a [`CounterError`] if the counters cannot be opened. The pool then fails to start.
    fn build(
        &self,
        thread_id: OsThreadId,
        processor_id: ProcessorId,
    ) -> Result<Box<dyn Profiler>, CounterError>;
}

impl<T: ProfilerBuilder + ?Sized> ProfilerBuilder for Arc<T> {
    fn build(
        &self,
        thread_id: OsThreadId,
        processor_id: ProcessorId,
    ) -> Result<Box<dyn Profiler>, CounterError> {
        (**self).build(thread_id, processor_id)
    }
}

use crate::{
    Context, CounterError, OsThreadId, Poolable, ProcessorId, ProfileError, Profiler,
    ProfilerBuilder, Span,
};

/// Executes units of work without measuring anything.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct NoopProfiler;

impl Profiler for NoopProfiler {
    fn profile(
        &mut self,
        cx: &Context,
        _span: &mut dyn Span,
        work: &Poolable,
    ) -> Result<(), ProfileError> {
        work.call(cx).map_err(ProfileError::Work)
    }
}

/// Builds [`NoopProfiler`]s. This is the default profiler builder of the pool.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct NoopProfilerBuilder;

impl NoopProfilerBuilder {
    /// Creates a builder for profilers that measure nothing.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ProfilerBuilder for NoopProfilerBuilder {
    fn build(
        &self,
        _thread_id: OsThreadId,
        _processor_id: ProcessorId,
    ) -> Result<Box<dyn Profiler>, CounterError> {
        Ok(Box::new(NoopProfiler))
    }
}

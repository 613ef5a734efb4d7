use std::sync::Arc;

use crate::pal::PlatformFacade;
use crate::profilers::{CounterSource, profile_counted};
use crate::{
    Context, CounterError, CounterGroup, EventDescriptor, OsThreadId, Poolable, ProcessorId,
    ProfileError, Profiler, ProfilerBuilder, Span,
};

/// One event of a [`CounterGroupProfiler`] and the span attribute its value is written to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EventConfig {
    descriptor: EventDescriptor,
    span_key: String,
}

impl EventConfig {
    /// Counts `descriptor` and attaches the value under `span_key`.
    #[must_use]
    pub fn new(descriptor: EventDescriptor, span_key: impl Into<String>) -> Self {
        Self {
            descriptor,
            span_key: span_key.into(),
        }
    }

    /// The event being counted.
    #[must_use]
    pub fn descriptor(&self) -> &EventDescriptor {
        &self.descriptor
    }

    /// The span attribute the value is attached under.
    #[must_use]
    pub fn span_key(&self) -> &str {
        &self.span_key
    }
}

struct GroupSource<'a> {
    group: &'a mut CounterGroup,
    configs: &'a [EventConfig],
}

impl CounterSource for GroupSource<'_> {
    fn reset_counters(&mut self) -> Result<(), CounterError> {
        self.group.reset()
    }

    fn attach_counters(&mut self, span: &mut dyn Span) -> Result<(), CounterError> {
        let values = self.group.read()?;

        for (config, value) in self.configs.iter().zip(values) {
            span.set_attribute(&config.span_key, *value);
        }

        Ok(())
    }
}

/// Annotates spans with an arbitrary set of counters, read together as one group.
///
/// Value `i` of the group is attached under the span key of event `i`.
#[derive(Debug)]
pub struct CounterGroupProfiler {
    group: CounterGroup,
    configs: Arc<[EventConfig]>,
    return_on_error: bool,
}

impl Profiler for CounterGroupProfiler {
    fn profile(
        &mut self,
        cx: &Context,
        span: &mut dyn Span,
        work: &Poolable,
    ) -> Result<(), ProfileError> {
        let mut source = GroupSource {
            group: &mut self.group,
            configs: &self.configs,
        };

        profile_counted(&mut source, self.return_on_error, cx, span, work)
    }
}

/// Builds [`CounterGroupProfiler`]s.
///
/// # Example
///
/// ```
/// use perf_pool::{
///     CounterGroupProfilerBuilder, EventConfig, EventDescriptor, HardwareEvent, SoftwareEvent,
/// };
///
/// let builder = CounterGroupProfilerBuilder::new(vec![
///     EventConfig::new(EventDescriptor::hardware(HardwareEvent::Instructions), "instructions"),
///     EventConfig::new(
///         EventDescriptor::software(SoftwareEvent::PageFaults),
///         "page_faults",
///     ),
/// ])
/// .unwrap()
/// .return_on_error(true);
/// # drop(builder);
/// ```
#[derive(Clone, Debug)]
pub struct CounterGroupProfilerBuilder {
    configs: Arc<[EventConfig]>,
    return_on_error: bool,
    platform: PlatformFacade,
}

impl CounterGroupProfilerBuilder {
    /// Creates a builder for profilers counting the given events, in order.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::EmptyGroup`] if `configs` is empty.
    pub fn new(configs: Vec<EventConfig>) -> Result<Self, CounterError> {
        if configs.is_empty() {
            return Err(CounterError::EmptyGroup);
        }

        Ok(Self {
            configs: configs.into(),
            return_on_error: false,
            platform: PlatformFacade::real(),
        })
    }

    /// If set, a failing unit of work returns its error immediately and the counters are not
    /// read, so the span gets no counter attributes.
    #[must_use]
    pub fn return_on_error(mut self, value: bool) -> Self {
        self.return_on_error = value;
        self
    }

    #[cfg(test)]
    pub(crate) fn platform(mut self, platform: PlatformFacade) -> Self {
        self.platform = platform;
        self
    }
}

impl ProfilerBuilder for CounterGroupProfilerBuilder {
    fn build(
        &self,
        thread_id: OsThreadId,
        processor_id: ProcessorId,
    ) -> Result<Box<dyn Profiler>, CounterError> {
        let descriptors: Vec<_> = self
            .configs
            .iter()
            .map(|config| config.descriptor.clone())
            .collect();

        let group = CounterGroup::open_with(
            self.platform.clone(),
            &descriptors,
            thread_id,
            processor_id,
        )?;

        group.reset()?;
        group.enable()?;

        Ok(Box::new(CounterGroupProfiler {
            group,
            configs: Arc::clone(&self.configs),
            return_on_error: self.return_on_error,
        }))
    }
}

use crate::pal::PlatformFacade;
use crate::profilers::{CounterSource, profile_counted};
use crate::{
    Context, CounterError, HardwareCounters, OsThreadId, Poolable, ProcessorId, ProfileError,
    Profiler, ProfilerBuilder, Span,
};

/// Annotates spans with the generalized hardware counters of the worker's processor.
///
/// Each present [`HardwareEvent`][crate::HardwareEvent] is attached under its
/// [`attribute_key()`][crate::HardwareEvent::attribute_key].
#[derive(Debug)]
pub struct HardwareProfiler {
    counters: HardwareCounters,
    return_on_error: bool,
}

impl CounterSource for HardwareCounters {
    fn reset_counters(&mut self) -> Result<(), CounterError> {
        self.reset()
    }

    fn attach_counters(&mut self, span: &mut dyn Span) -> Result<(), CounterError> {
        for (event, value) in self.read()?.iter() {
            span.set_attribute(event.attribute_key(), value);
        }

        Ok(())
    }
}

impl Profiler for HardwareProfiler {
    fn profile(
        &mut self,
        cx: &Context,
        span: &mut dyn Span,
        work: &Poolable,
    ) -> Result<(), ProfileError> {
        profile_counted(&mut self.counters, self.return_on_error, cx, span, work)
    }
}

/// Builds [`HardwareProfiler`]s.
///
/// # Example
///
/// ```
/// use perf_pool::{HardwareProfilerBuilder, Manager};
///
/// let manager = Manager::builder()
///     .profiler_builder(HardwareProfilerBuilder::new().return_on_error(true))
///     .build();
/// # drop(manager);
/// ```
#[derive(Clone, Debug, Default)]
pub struct HardwareProfilerBuilder {
    return_on_error: bool,
    platform: PlatformFacade,
}

impl HardwareProfilerBuilder {
    /// Creates a builder with `return_on_error` disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
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

impl ProfilerBuilder for HardwareProfilerBuilder {
    fn build(
        &self,
        thread_id: OsThreadId,
        processor_id: ProcessorId,
    ) -> Result<Box<dyn Profiler>, CounterError> {
        let counters = HardwareCounters::open_with(self.platform.clone(), thread_id, processor_id)?;
        counters.enable()?;

        Ok(Box::new(HardwareProfiler {
            counters,
            return_on_error: self.return_on_error,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use mockall::Sequence;

    use super::*;
    use crate::counters::PerfEventAttr;
    use crate::fake::FakeSpan;
    use crate::pal::{CounterControl, MockPlatform};

    // Processor supports cycles and instructions only; counter fd = 100 + config.
    fn two_event_platform() -> MockPlatform {
        let mut platform = MockPlatform::new();

        platform
            .expect_open_counter()
            .returning(|attr: &PerfEventAttr, _, _, _| {
                if attr.config <= 1 {
                    Ok(i32::try_from(100 + attr.config).unwrap())
                } else {
                    Err(io::Error::from_raw_os_error(2))
                }
            });
        platform.expect_is_unsupported_event().return_const(true);
        platform.expect_close_counter().return_const(());

        platform
    }

    #[test]
    fn build_enables_counters() {
        let mut platform = two_event_platform();
        platform
            .expect_control_counter()
            .withf(|_, control, _| *control == CounterControl::Enable)
            .times(2)
            .returning(|_, _, _| Ok(()));

        HardwareProfilerBuilder::new()
            .platform(platform.into())
            .build(1, 0)
            .unwrap();
    }

    #[test]
    fn build_propagates_open_failure() {
        let mut platform = MockPlatform::new();
        platform
            .expect_open_counter()
            .returning(|_, _, _, _| Err(io::Error::from_raw_os_error(13)));
        platform.expect_is_unsupported_event().return_const(false);

        let result = HardwareProfilerBuilder::new()
            .platform(platform.into())
            .build(1, 0);

        assert!(matches!(result, Err(CounterError::Open { .. })));
    }

    #[test]
    fn attaches_present_counters() {
        let mut platform = two_event_platform();
        let mut seq = Sequence::new();

        platform
            .expect_control_counter()
            .withf(|_, control, _| *control == CounterControl::Enable)
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        platform
            .expect_control_counter()
            .withf(|_, control, _| *control == CounterControl::Reset)
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        platform
            .expect_read_counter()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|fd, buffer: &mut [u64]| {
                buffer[0] = u64::try_from(fd).unwrap();
                Ok(1)
            });

        let mut profiler = HardwareProfilerBuilder::new()
            .platform(platform.into())
            .build(1, 0)
            .unwrap();
        let mut span = FakeSpan::new(true);

        profiler
            .profile(&Context::new(), &mut span, &Poolable::new(|_| Ok(())))
            .unwrap();

        assert_eq!(
            span.attributes(),
            vec![
                ("CPUCycles".to_owned(), 100),
                ("Instructions".to_owned(), 101)
            ]
        );
    }

    #[test]
    fn return_on_error_skips_attributes() {
        let mut platform = two_event_platform();
        platform.expect_control_counter().returning(|_, _, _| Ok(()));
        platform.expect_read_counter().never();

        let mut profiler = HardwareProfilerBuilder::new()
            .return_on_error(true)
            .platform(platform.into())
            .build(1, 0)
            .unwrap();
        let mut span = FakeSpan::new(true);

        let error = profiler
            .profile(
                &Context::new(),
                &mut span,
                &Poolable::new(|_| Err(io::Error::other("failed").into())),
            )
            .unwrap_err();

        assert!(matches!(error, ProfileError::Work(_)));
        assert!(span.attributes().is_empty());
    }
}

//! Fake tracer, span and profiler for unit tests. They record every interaction so tests can
//! assert on what the pool did with them.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::{
    Context, CounterError, OsThreadId, Poolable, ProcessorId, ProfileError, Profiler,
    ProfilerBuilder, Span, SpanOptions, Tracer,
};

#[derive(Debug, Default)]
pub(crate) struct SpanRecord {
    pub(crate) name: String,
    pub(crate) options: SpanOptions,
    pub(crate) attributes: Vec<(String, u64)>,
    pub(crate) end_count: usize,
}

#[derive(Debug)]
pub(crate) struct FakeSpan {
    recording: bool,
    record: Arc<Mutex<SpanRecord>>,
}

impl FakeSpan {
    pub(crate) fn new(recording: bool) -> Self {
        Self {
            recording,
            record: Arc::default(),
        }
    }

    pub(crate) fn attributes(&self) -> Vec<(String, u64)> {
        self.record.lock().attributes.clone()
    }
}

impl Span for FakeSpan {
    fn is_recording_events(&self) -> bool {
        self.recording
    }

    fn set_attribute(&mut self, key: &str, value: u64) {
        self.record.lock().attributes.push((key.to_owned(), value));
    }

    fn end(&mut self) {
        self.record.lock().end_count += 1;
    }
}

/// Hands out [`FakeSpan`]s and keeps a record of each of them.
#[derive(Debug)]
pub(crate) struct FakeTracer {
    recording: bool,
    spans: Mutex<Vec<Arc<Mutex<SpanRecord>>>>,
}

impl FakeTracer {
    pub(crate) fn new(recording: bool) -> Self {
        Self {
            recording,
            spans: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn span_count(&self) -> usize {
        self.spans.lock().len()
    }

    pub(crate) fn with_spans<R>(&self, f: impl FnOnce(&[Arc<Mutex<SpanRecord>>]) -> R) -> R {
        f(&self.spans.lock())
    }
}

impl Tracer for FakeTracer {
    fn start(&self, cx: &Context, name: &str, options: SpanOptions) -> (Context, Box<dyn Span>) {
        let record = Arc::new(Mutex::new(SpanRecord {
            name: name.to_owned(),
            options,
            ..SpanRecord::default()
        }));

        self.spans.lock().push(Arc::clone(&record));

        let span = FakeSpan {
            recording: self.recording,
            record,
        };

        (cx.clone(), Box::new(span))
    }
}

/// Builds [`FakeProfiler`]s, optionally failing on chosen processors.
#[derive(Debug, Default)]
pub(crate) struct FakeProfilerBuilder {
    failing_processors: HashSet<ProcessorId>,
    build_delay: Duration,
    builds: Mutex<Vec<(OsThreadId, ProcessorId)>>,
    profiles: Arc<AtomicUsize>,
}

impl FakeProfilerBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_on(mut self, processor_id: ProcessorId) -> Self {
        self.failing_processors.insert(processor_id);
        self
    }

    pub(crate) fn build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = delay;
        self
    }

    pub(crate) fn builds(&self) -> Vec<(OsThreadId, ProcessorId)> {
        self.builds.lock().clone()
    }

    pub(crate) fn profile_count(&self) -> usize {
        self.profiles.load(Ordering::Relaxed)
    }
}

impl ProfilerBuilder for FakeProfilerBuilder {
    fn build(
        &self,
        thread_id: OsThreadId,
        processor_id: ProcessorId,
    ) -> Result<Box<dyn Profiler>, CounterError> {
        thread::sleep(self.build_delay);

        self.builds.lock().push((thread_id, processor_id));

        if self.failing_processors.contains(&processor_id) {
            return Err(CounterError::NoneAvailable { processor_id });
        }

        Ok(Box::new(FakeProfiler {
            processor_id,
            profiles: Arc::clone(&self.profiles),
        }))
    }
}

/// Runs the work and, if the span is recording, attaches the worker's processor ID.
#[derive(Debug)]
pub(crate) struct FakeProfiler {
    processor_id: ProcessorId,
    profiles: Arc<AtomicUsize>,
}

impl Profiler for FakeProfiler {
    fn profile(
        &mut self,
        cx: &Context,
        span: &mut dyn Span,
        work: &Poolable,
    ) -> Result<(), ProfileError> {
        self.profiles.fetch_add(1, Ordering::Relaxed);

        let result = work.call(cx).map_err(ProfileError::Work);

        if span.is_recording_events() {
            span.set_attribute("processor", u64::from(self.processor_id));
        }

        result
    }
}

use std::fmt::Debug;
use std::sync::Arc;

use crate::Context;

/// Options for starting a span.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct SpanOptions {
    /// Whether the caller wants the span to record events and attributes.
    ///
    /// Tracers are free to ignore this if recording is decided elsewhere (e.g. by a sampler).
    pub record_events: bool,
}

impl SpanOptions {
    /// Options for a span that should record events and attributes.
    #[must_use]
    pub const fn recording() -> Self {
        Self {
            record_events: true,
        }
    }
}

/// A tracing span representing one execution interval.
///
/// The pool starts one span per unit of work, passes it to the profiler and ends it once the
/// profiler returns.
pub trait Span {
    /// Whether the span records attributes. Profilers skip all counter work when it does not.
    fn is_recording_events(&self) -> bool;

    /// Attaches an unsigned 64-bit attribute to the span.
    fn set_attribute(&mut self, key: &str, value: u64);

    /// Ends the span. Called exactly once by the worker.
    fn end(&mut self);
}

/// Starts spans for units of work executed by the pool.
///
/// A single tracer is shared by all workers of a [`Manager`][crate::Manager].
pub trait Tracer: Debug + Send + Sync {
    /// Starts a span named `name` as a child of `cx`.
    ///
    /// Returns the context the unit of work should execute in (typically `cx` extended with the
    /// new span) and the span itself.
    fn start(&self, cx: &Context, name: &str, options: SpanOptions) -> (Context, Box<dyn Span>);
}

impl<T: Tracer + ?Sized> Tracer for Arc<T> {
    fn start(&self, cx: &Context, name: &str, options: SpanOptions) -> (Context, Box<dyn Span>) {
        (**self).start(cx, name, options)
    }
}

/// A tracer whose spans never record anything.
///
/// This is the default tracer of the pool. Profilers do no counter work under it, so units of
/// work execute with no profiling overhead.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct NoopTracer;

impl NoopTracer {
    /// Creates a no-op tracer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Tracer for NoopTracer {
    fn start(&self, cx: &Context, _name: &str, _options: SpanOptions) -> (Context, Box<dyn Span>) {
        (cx.clone(), Box::new(NoopSpan))
    }
}

/// A span that records nothing.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct NoopSpan;

impl Span for NoopSpan {
    fn is_recording_events(&self) -> bool {
        false
    }

    fn set_attribute(&mut self, _key: &str, _value: u64) {}

    fn end(&mut self) {}
}

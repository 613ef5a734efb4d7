use std::any::type_name;
use std::fmt;

use opentelemetry::KeyValue;
use opentelemetry::trace::{self as otel, TraceContextExt};

use crate::{Context, Span, SpanOptions, Tracer};

/// Adapts an OpenTelemetry tracer to the pool's [`Tracer`] interface.
///
/// Each unit of work gets an OpenTelemetry span that is a child of the span in the submitted
/// [`Context`], if any. The unit of work executes in a context carrying the new span, so spans
/// it starts itself nest under it.
///
/// Whether a span records attributes is decided by the OpenTelemetry sampler.
/// [`SpanOptions::record_events`] has no equivalent there and is ignored.
///
/// Counter values are written as `i64` attributes, saturating at `i64::MAX`.
///
/// # Example
///
/// ```
/// use opentelemetry::global;
/// use perf_pool::{Manager, OtelTracer};
///
/// let manager = Manager::builder()
///     .tracer(OtelTracer::new(global::tracer("my_service")))
///     .build();
/// # drop(manager);
/// ```
pub struct OtelTracer<T> {
    inner: T,
}

impl<T> OtelTracer<T> {
    /// Wraps an OpenTelemetry tracer.
    #[must_use]
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T> fmt::Debug for OtelTracer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>()).finish_non_exhaustive()
    }
}

impl<T> Tracer for OtelTracer<T>
where
    T: otel::Tracer + Send + Sync,
    T::Span: Send + Sync + 'static,
{
    fn start(&self, cx: &Context, name: &str, _options: SpanOptions) -> (Context, Box<dyn Span>) {
        let span = self.inner.start_with_context(name.to_owned(), cx);
        let cx = cx.with_span(span);

        (cx.clone(), Box::new(OtelSpan { cx }))
    }
}

/// Handle to the OpenTelemetry span stored in a context.
#[derive(Debug)]
struct OtelSpan {
    cx: Context,
}

impl Span for OtelSpan {
    fn is_recording_events(&self) -> bool {
        self.cx.span().is_recording()
    }

    fn set_attribute(&mut self, key: &str, value: u64) {
        let value = i64::try_from(value).unwrap_or(i64::MAX);

        self.cx
            .span()
            .set_attribute(KeyValue::new(key.to_owned(), value));
    }

    fn end(&mut self) {
        self.cx.span().end();
    }
}

//! Counts system call tracepoints and software events per unit of work.
//!
//! Tracepoints are resolved through the kernel tracing filesystem, which usually requires root.
//!
//! Run with: `sudo cargo run --example tracepoints`.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use perf_pool::{
    Context, CounterError, CounterGroupProfilerBuilder, EventConfig, EventDescriptor, Manager,
    OtelTracer, Poolable, SoftwareEvent,
};

fn event_configs() -> Result<Vec<EventConfig>, CounterError> {
    Ok(vec![
        EventConfig::new(
            EventDescriptor::tracepoint("syscalls", "sys_enter_getcwd")?,
            "getcwd_calls",
        ),
        EventConfig::new(
            EventDescriptor::software(SoftwareEvent::TaskClock),
            "task_clock_ns",
        ),
        EventConfig::new(
            EventDescriptor::software(SoftwareEvent::PageFaults),
            "page_faults",
        ),
    ])
}

fn main() {
    tracing_subscriber::fmt().init();

    let configs = match event_configs() {
        Ok(configs) => configs,
        Err(error) => {
            eprintln!("failed to describe events: {error}");
            return;
        }
    };

    let profiler = match CounterGroupProfilerBuilder::new(configs) {
        Ok(profiler) => profiler.return_on_error(true),
        Err(error) => {
            eprintln!("invalid counter group: {error}");
            return;
        }
    };

    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
        .build();

    let manager = Manager::builder()
        .tracer(OtelTracer::new(provider.tracer("tracepoints-demo")))
        .profiler_builder(profiler)
        .build();

    if let Err(error) = manager.start() {
        eprintln!("failed to start pool: {error}");
        return;
    }

    // Each call should report exactly as many getcwd calls as it makes.
    for calls in [1, 5, 10] {
        let work = Poolable::new(move |_| {
            for _ in 0..calls {
                std::env::current_dir()?;
            }
            Ok(())
        });

        if let Err(error) = manager.dispatch(&Context::new(), &work) {
            eprintln!("unit of work failed: {error}");
        }
    }

    if let Err(error) = manager.stop() {
        eprintln!("failed to stop pool: {error}");
    }

    if let Err(error) = provider.shutdown() {
        eprintln!("failed to shut down tracer provider: {error}");
    }
}

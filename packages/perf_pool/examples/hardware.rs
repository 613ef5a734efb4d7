//! Executes a few units of work on a pool that attaches hardware counter readings to spans and
//! prints the finished spans to stdout.
//!
//! Opening counters may require `perf_event_paranoid` to be lowered, e.g.
//! `sudo sysctl kernel.perf_event_paranoid=1`.
//!
//! Run with: `cargo run --example hardware`.
#![expect(
    clippy::arithmetic_side_effects,
    reason = "this is example code that does not need production-level safety"
)]

use std::hint::black_box;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use perf_pool::{Context, HardwareProfilerBuilder, Manager, OtelTracer, Poolable};

fn main() {
    tracing_subscriber::fmt().init();

    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
        .build();

    let manager = Manager::builder()
        .tracer(OtelTracer::new(provider.tracer("hardware-demo")))
        .profiler_builder(HardwareProfilerBuilder::new())
        .build();

    if let Err(error) = manager.start() {
        eprintln!("failed to start pool: {error}");
        return;
    }

    println!("Pool running {} workers", manager.worker_count());

    let pooled = manager.pool(Poolable::new(|_| {
        let mut primes = 0_u32;
        for candidate in 2..20_000_u32 {
            if (2..candidate).take_while(|d| d * d <= candidate).all(|d| candidate % d != 0) {
                primes = primes.wrapping_add(1);
            }
        }
        black_box(primes);
        Ok(())
    }));

    for _ in 0..3 {
        if let Err(error) = pooled.call(&Context::new()) {
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

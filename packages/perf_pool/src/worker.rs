//! Worker thread logic: pinning, profiler setup and the dispatch loop.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, TryRecvError, select};
use tracing::{debug, error, trace, warn};

use crate::affinity::PinGuard;
use crate::dispatch::{AsyncDispatch, SyncDispatch};
use crate::metrics::{DISPATCH_DELAY_MS, EXECUTION_TIME_MS, WORK_FAILURES};
use crate::pal::{Platform, PlatformFacade};
use crate::{
    Context, CounterError, PoolError, Poolable, ProcessorId, Profiler, ProfilerBuilder,
    SpanOptions, Tracer,
};

/// Everything a worker needs that is fixed when the manager is built.
#[derive(Debug)]
pub(crate) struct WorkerConfig {
    pub(crate) processor_id: ProcessorId,
    pub(crate) tracer: Arc<dyn Tracer>,
    pub(crate) profiler_builder: Arc<dyn ProfilerBuilder>,
    pub(crate) platform: PlatformFacade,
}

pub(crate) struct WorkerChannels {
    pub(crate) sync_rx: Receiver<SyncDispatch>,
    pub(crate) detached_rx: Receiver<AsyncDispatch>,

    /// Never carries a message. The worker stops once all senders are gone.
    pub(crate) stop_rx: Receiver<()>,
}

/// Executes units of work under one worker's tracer and profiler.
pub(crate) struct WorkerCore {
    processor_id: ProcessorId,
    tracer: Arc<dyn Tracer>,
    profiler: Box<dyn Profiler>,
    span_name: String,
}

impl WorkerCore {
    pub(crate) fn new(
        processor_id: ProcessorId,
        span_name: String,
        tracer: Arc<dyn Tracer>,
        profiler: Box<dyn Profiler>,
    ) -> Self {
        Self {
            processor_id,
            tracer,
            profiler,
            span_name,
        }
    }

    /// Runs one unit of work inside its own span. The span has ended by the time this returns.
    pub(crate) fn execute(
        &mut self,
        cx: &Context,
        work: &Poolable,
        enqueued_at: Instant,
    ) -> Result<(), PoolError> {
        DISPATCH_DELAY_MS.with(|e| e.observe_millis(enqueued_at.elapsed()));

        let (cx, mut span) = self
            .tracer
            .start(cx, &self.span_name, SpanOptions::recording());

        let started = Instant::now();

        let profiler = &mut self.profiler;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            profiler.profile(&cx, span.as_mut(), work)
        }));

        EXECUTION_TIME_MS.with(|e| e.observe_millis(started.elapsed()));

        span.end();

        let result = match outcome {
            Ok(result) => result.map_err(PoolError::from),
            Err(_payload) => {
                error!(
                    processor_id = self.processor_id,
                    "unit of work panicked; worker continues"
                );

                Err(PoolError::WorkPanicked {
                    processor_id: self.processor_id,
                })
            }
        };

        if result.is_err() {
            WORK_FAILURES.with(|e| e.observe_once());
        }

        trace!(
            processor_id = self.processor_id,
            success = result.is_ok(),
            "executed unit of work"
        );

        result
    }

    pub(crate) fn execute_sync(&mut self, dispatch: SyncDispatch) {
        let outcome = self.execute(&dispatch.cx, &dispatch.work, dispatch.enqueued_at);

        if !dispatch.complete(outcome) {
            trace!(
                processor_id = self.processor_id,
                "submitter stopped waiting for the outcome"
            );
        }
    }

    pub(crate) fn execute_detached(&mut self, dispatch: AsyncDispatch) {
        if let Err(error) = self.execute(&dispatch.cx, &dispatch.work, dispatch.enqueued_at) {
            warn!(
                processor_id = self.processor_id,
                %error,
                "detached unit of work failed"
            );
        }
    }
}

/// Body of a worker thread.
///
/// Reports on `ready` whether the profiler could be built. Only on success does the worker enter
/// its dispatch loop, which it leaves once the stop channel disconnects.
pub(crate) fn run_worker(
    config: WorkerConfig,
    channels: WorkerChannels,
    ready: oneshot::Sender<Result<(), CounterError>>,
) {
    let processor_id = config.processor_id;
    let thread_id = config.platform.current_thread_id();

    let _pin = PinGuard::pin_current_thread(&config.platform, processor_id);

    let profiler = match config.profiler_builder.build(thread_id, processor_id) {
        Ok(profiler) => profiler,
        Err(build_error) => {
            error!(processor_id, thread_id, error = %build_error, "failed to build profiler");

            if ready.send(Err(build_error)).is_err() {
                debug!(processor_id, "manager stopped waiting for worker");
            }

            return;
        }
    };

    if ready.send(Ok(())).is_err() {
        debug!(processor_id, "manager stopped waiting for worker");
        return;
    }

    debug!(processor_id, thread_id, "worker thread started");

    let mut core = WorkerCore::new(
        processor_id,
        format!("pool-{thread_id}"),
        config.tracer,
        profiler,
    );

    loop {
        if matches!(channels.stop_rx.try_recv(), Err(TryRecvError::Disconnected)) {
            break;
        }

        select! {
            recv(channels.sync_rx) -> dispatch => match dispatch {
                Ok(dispatch) => core.execute_sync(dispatch),
                Err(_disconnected) => break,
            },
            recv(channels.detached_rx) -> dispatch => match dispatch {
                Ok(dispatch) => core.execute_detached(dispatch),
                Err(_disconnected) => break,
            },
            recv(channels.stop_rx) -> _ => break,
        }
    }

    debug!(processor_id, thread_id, "worker thread exiting");
}

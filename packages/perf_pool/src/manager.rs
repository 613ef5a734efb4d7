use std::any::type_name;
use std::fmt;
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use nonempty::NonEmpty;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error};

use crate::affinity::detect_processors;
use crate::dispatch::{AsyncDispatch, SyncDispatch};
use crate::pal::PlatformFacade;
use crate::worker::{WorkerChannels, WorkerConfig, run_worker};
use crate::{
    Context, NoopProfilerBuilder, NoopTracer, PoolError, Poolable, ProcessorId, ProfilerBuilder,
    Tracer,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

/// State shared between the manager and every adapter returned by [`Manager::pool()`].
struct ManagerShared {
    // Submitters hold the read lock while enqueueing, so once `stop()` has taken the write lock
    // and flipped this to `Stopped`, no new record can appear in the channels.
    lifecycle: RwLock<Lifecycle>,

    sync_tx: Sender<SyncDispatch>,
    sync_rx: Receiver<SyncDispatch>,

    detached_tx: Sender<AsyncDispatch>,
    detached_rx: Receiver<AsyncDispatch>,

    asynchronous: bool,
}

impl ManagerShared {
    fn dispatch(&self, cx: &Context, work: &Poolable) -> Result<(), PoolError> {
        let (dispatch, outcome) = SyncDispatch::new(cx, work);

        {
            let lifecycle = self.lifecycle.read();

            if *lifecycle == Lifecycle::Stopped {
                return Err(PoolError::Stopped);
            }

            if self.sync_tx.send(dispatch).is_err() {
                return Err(PoolError::Stopped);
            }
        }

        // The record is only ever dropped without an outcome if it is drained after stopping.
        outcome.recv().unwrap_or(Err(PoolError::Abandoned))
    }

    fn dispatch_detached(&self, cx: &Context, work: &Poolable) -> Result<(), PoolError> {
        let lifecycle = self.lifecycle.read();

        if *lifecycle == Lifecycle::Stopped {
            return Err(PoolError::Stopped);
        }

        self.detached_tx
            .send(AsyncDispatch::new(cx, work))
            .map_err(|_disconnected| PoolError::Stopped)
    }

    fn abandon_queued(&self) -> usize {
        let mut abandoned = 0_usize;

        while let Ok(dispatch) = self.sync_rx.try_recv() {
            // The submitter may have gone away already, which is fine.
            _ = dispatch.complete(Err(PoolError::Abandoned));
            abandoned = abandoned.saturating_add(1);
        }

        while self.detached_rx.try_recv().is_ok() {
            abandoned = abandoned.saturating_add(1);
        }

        abandoned
    }
}

#[derive(Default)]
struct WorkerControl {
    // Workers exit once this is dropped.
    stop_tx: Option<Sender<()>>,
    handles: Vec<(ProcessorId, JoinHandle<()>)>,
}

/// A pool of worker threads, one per processor, that executes units of work inside tracing spans
/// annotated by a profiler.
///
/// # Lifecycle
///
/// A new manager has no threads. [`start()`][Self::start] launches the workers and waits until
/// each has pinned itself to its processor and built its profiler. [`stop()`][Self::stop] waits
/// for in-flight units of work to finish, terminates the workers and abandons whatever is still
/// queued. A stopped manager cannot be restarted.
///
/// Dropping the manager stops it.
///
/// # Example
///
/// ```
/// use perf_pool::{Context, Manager, Poolable};
///
/// let manager = Manager::new();
/// manager.start().unwrap();
///
/// let pooled = manager.pool(Poolable::new(|_cx| {
///     let _sum: u64 = (1..=1000).sum();
///     Ok(())
/// }));
///
/// // Blocks until a worker has executed the work.
/// pooled.call(&Context::new()).unwrap();
///
/// manager.stop().unwrap();
/// ```
pub struct Manager {
    shared: Arc<ManagerShared>,

    processors: Vec<ProcessorId>,
    tracer: Arc<dyn Tracer>,
    profiler_builder: Arc<dyn ProfilerBuilder>,
    platform: PlatformFacade,

    control: Mutex<WorkerControl>,
}

impl Manager {
    /// Creates a manager with the default configuration: one worker per processor the current
    /// thread may run on, no tracing, no profiling and synchronous dispatch.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring the manager.
    #[must_use]
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    /// Launches the workers.
    ///
    /// Returns once every worker has pinned itself and built its profiler. Units of work
    /// submitted before this call are executed once the workers are up.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ProfilerBuild`] if any worker fails to build its profiler. All
    /// workers are then stopped and the manager can no longer be used.
    ///
    /// Returns [`PoolError::AlreadyStarted`] if the workers are already running and
    /// [`PoolError::Stopped`] if the manager has been stopped.
    pub fn start(&self) -> Result<(), PoolError> {
        let mut control = self.control.lock();

        match *self.shared.lifecycle.read() {
            Lifecycle::Created => {}
            Lifecycle::Running => return Err(PoolError::AlreadyStarted),
            Lifecycle::Stopped => return Err(PoolError::Stopped),
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let mut failure = None;
        let mut pending = Vec::with_capacity(self.processors.len());

        for &processor_id in &self.processors {
            let (ready_tx, ready_rx) = oneshot::channel();

            let config = WorkerConfig {
                processor_id,
                tracer: Arc::clone(&self.tracer),
                profiler_builder: Arc::clone(&self.profiler_builder),
                platform: self.platform.clone(),
            };

            let channels = WorkerChannels {
                sync_rx: self.shared.sync_rx.clone(),
                detached_rx: self.shared.detached_rx.clone(),
                stop_rx: stop_rx.clone(),
            };

            let spawned = thread::Builder::new()
                .name(format!("perf-pool-p{processor_id}"))
                .spawn(move || run_worker(config, channels, ready_tx));

            match spawned {
                Ok(handle) => {
                    control.handles.push((processor_id, handle));
                    pending.push((processor_id, ready_rx));
                }
                Err(source) => {
                    error!(processor_id, %source, "failed to spawn worker thread");
                    failure = Some(PoolError::WorkerSpawn {
                        processor_id,
                        source,
                    });
                    break;
                }
            }
        }

        control.stop_tx = Some(stop_tx);

        for (processor_id, ready_rx) in pending {
            let error = match ready_rx.recv() {
                Ok(Ok(())) => continue,
                Ok(Err(source)) => PoolError::ProfilerBuild {
                    processor_id,
                    source,
                },
                Err(_disconnected) => PoolError::WorkerLost { processor_id },
            };

            // Keep waiting for the rest so that every worker is past its startup.
            failure.get_or_insert(error);
        }

        if let Some(error) = failure {
            // The first failure is what the caller needs to see; stop() errors are secondary.
            if let Err(stop_error) = self.shutdown(&mut control) {
                debug!(%stop_error, "secondary failure while stopping after failed start");
            }

            return Err(error);
        }

        {
            let mut lifecycle = self.shared.lifecycle.write();

            if *lifecycle == Lifecycle::Created {
                *lifecycle = Lifecycle::Running;
            }
        }

        debug!(workers = self.processors.len(), "pool started");

        Ok(())
    }

    /// Stops the workers.
    ///
    /// Units of work that are executing when this is called run to completion. Units of work
    /// still queued are abandoned: synchronous submitters receive [`PoolError::Abandoned`].
    /// Later submissions fail with [`PoolError::Stopped`].
    ///
    /// Calling this more than once has no further effect.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::WorkerLost`] if a worker thread terminated abnormally.
    pub fn stop(&self) -> Result<(), PoolError> {
        let mut control = self.control.lock();
        self.shutdown(&mut control)
    }

    fn shutdown(&self, control: &mut WorkerControl) -> Result<(), PoolError> {
        *self.shared.lifecycle.write() = Lifecycle::Stopped;

        drop(control.stop_tx.take());

        let mut result = Ok(());

        for (processor_id, handle) in mem::take(&mut control.handles) {
            if handle.join().is_err() {
                error!(processor_id, "worker thread terminated abnormally");

                if result.is_ok() {
                    result = Err(PoolError::WorkerLost { processor_id });
                }
            }
        }

        let abandoned = self.shared.abandon_queued();

        debug!(abandoned, "pool stopped");

        result
    }

    /// Wraps a unit of work so that calling the wrapper executes it on the pool.
    ///
    /// In synchronous mode (the default) calling the wrapper blocks until a worker has executed
    /// `work` and returns its outcome. In asynchronous mode the wrapper returns as soon as the
    /// work is queued.
    ///
    /// Errors returned by the wrapper are boxed [`PoolError`]s.
    #[must_use]
    pub fn pool(&self, work: Poolable) -> Poolable {
        let shared = Arc::clone(&self.shared);

        if shared.asynchronous {
            Poolable::new(move |cx| {
                shared
                    .dispatch_detached(cx, &work)
                    .map_err(Into::into)
            })
        } else {
            Poolable::new(move |cx| shared.dispatch(cx, &work).map_err(Into::into))
        }
    }

    /// Executes a unit of work on the pool and waits for the outcome.
    ///
    /// # Errors
    ///
    /// Returns the failure of the unit of work or its profiler, or [`PoolError::Stopped`] /
    /// [`PoolError::Abandoned`] if the pool stops before executing it.
    pub fn dispatch(&self, cx: &Context, work: &Poolable) -> Result<(), PoolError> {
        self.shared.dispatch(cx, work)
    }

    /// Queues a unit of work for execution without waiting for it.
    ///
    /// Failures of the unit of work are logged and counted in metrics but not reported.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Stopped`] if the pool has been stopped.
    pub fn dispatch_detached(&self, cx: &Context, work: &Poolable) -> Result<(), PoolError> {
        self.shared.dispatch_detached(cx, work)
    }

    /// The processors the workers run on, one worker per processor.
    #[must_use]
    pub fn processors(&self) -> &[ProcessorId] {
        &self.processors
    }

    /// Number of workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.processors.len()
    }

    /// Whether the workers have been started and not yet stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.shared.lifecycle.read() == Lifecycle::Running
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            error!(%error, "failed to stop pool cleanly");
        }
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("processors", &self.processors)
            .field("lifecycle", &*self.shared.lifecycle.read())
            .field("asynchronous", &self.shared.asynchronous)
            .field("tracer", &self.tracer)
            .field("profiler_builder", &self.profiler_builder)
            .finish_non_exhaustive()
    }
}

/// Configures and creates a [`Manager`].
///
/// # Example
///
/// ```
/// use nonempty::nonempty;
/// use perf_pool::{Manager, NoopProfilerBuilder, NoopTracer};
///
/// let manager = Manager::builder()
///     .tracer(NoopTracer::new())
///     .profiler_builder(NoopProfilerBuilder::new())
///     .asynchronous(true)
///     .processors(nonempty![0])
///     .build();
///
/// assert_eq!(manager.worker_count(), 1);
/// ```
#[derive(Debug)]
#[must_use]
pub struct ManagerBuilder {
    tracer: Arc<dyn Tracer>,
    profiler_builder: Arc<dyn ProfilerBuilder>,
    asynchronous: bool,
    processors: Option<Vec<ProcessorId>>,
    platform: PlatformFacade,
}

impl ManagerBuilder {
    fn new() -> Self {
        Self {
            tracer: Arc::new(NoopTracer::new()),
            profiler_builder: Arc::new(NoopProfilerBuilder::new()),
            asynchronous: false,
            processors: None,
            platform: PlatformFacade::real(),
        }
    }

    /// Sets the tracer that starts a span around each unit of work.
    ///
    /// Defaults to [`NoopTracer`], under which profilers do no counter work.
    pub fn tracer(mut self, tracer: impl Tracer + 'static) -> Self {
        self.tracer = Arc::new(tracer);
        self
    }

    /// Sets the builder every worker uses to create its profiler.
    ///
    /// Defaults to [`NoopProfilerBuilder`].
    pub fn profiler_builder(mut self, builder: impl ProfilerBuilder + 'static) -> Self {
        self.profiler_builder = Arc::new(builder);
        self
    }

    /// Whether [`Manager::pool()`] adapters return as soon as the work is queued instead of
    /// waiting for it to execute.
    pub fn asynchronous(mut self, asynchronous: bool) -> Self {
        self.asynchronous = asynchronous;
        self
    }

    /// Restricts the workers to the given processors, one worker each.
    ///
    /// Defaults to every processor the building thread may run on.
    pub fn processors(mut self, processors: NonEmpty<ProcessorId>) -> Self {
        let mut unique = Vec::with_capacity(processors.len());

        for processor_id in processors {
            if !unique.contains(&processor_id) {
                unique.push(processor_id);
            }
        }

        self.processors = Some(unique);
        self
    }

    #[cfg(test)]
    pub(crate) fn platform(mut self, platform: PlatformFacade) -> Self {
        self.platform = platform;
        self
    }

    /// Creates the manager. No threads are started until [`Manager::start()`].
    #[must_use]
    pub fn build(self) -> Manager {
        let processors = self
            .processors
            .unwrap_or_else(|| detect_processors(&self.platform));

        let (sync_tx, sync_rx) = crossbeam_channel::unbounded();
        let (detached_tx, detached_rx) = crossbeam_channel::unbounded();

        debug!(?processors, asynchronous = self.asynchronous, "pool created");

        Manager {
            shared: Arc::new(ManagerShared {
                lifecycle: RwLock::new(Lifecycle::Created),
                sync_tx,
                sync_rx,
                detached_tx,
                detached_rx,
                asynchronous: self.asynchronous,
            }),
            processors,
            tracer: self.tracer,
            profiler_builder: self.profiler_builder,
            platform: self.platform,
            control: Mutex::new(WorkerControl::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use nonempty::nonempty;
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::fake::{FakeProfilerBuilder, FakeTracer};
    use crate::pal::MockPlatform;

    assert_impl_all!(Manager: Send, Sync);
    assert_impl_all!(ManagerBuilder: Send);

    // Four processors that accept pinning, with every worker reporting thread ID 500.
    fn fake_platform() -> PlatformFacade {
        let mut platform = MockPlatform::new();
        platform.expect_current_thread_id().return_const(500);
        platform
            .expect_current_thread_processors()
            .returning(|| Ok(vec![0, 1, 2, 3]));
        platform
            .expect_pin_current_thread_to()
            .returning(|_| Ok(()));
        platform.into()
    }

    fn counting_work(counter: &Arc<AtomicUsize>) -> Poolable {
        let counter = Arc::clone(counter);

        Poolable::new(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn one_worker_per_detected_processor() {
        let builder = Arc::new(FakeProfilerBuilder::new());

        let manager = Manager::builder()
            .platform(fake_platform())
            .profiler_builder(Arc::clone(&builder))
            .build();

        assert_eq!(manager.processors(), &[0, 1, 2, 3]);
        assert_eq!(manager.worker_count(), 4);

        manager.start().unwrap();

        let mut built_on: Vec<_> = builder
            .builds()
            .into_iter()
            .map(|(_, processor_id)| processor_id)
            .collect();
        built_on.sort_unstable();

        assert_eq!(built_on, vec![0, 1, 2, 3]);
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn explicit_processors_are_deduplicated() {
        let manager = Manager::builder()
            .platform(fake_platform())
            .processors(nonempty![2, 1, 2, 1])
            .build();

        assert_eq!(manager.processors(), &[2, 1]);
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn lifecycle_transitions() {
        let manager = Manager::builder().platform(fake_platform()).build();

        assert!(!manager.is_running());

        manager.start().unwrap();
        assert!(manager.is_running());
        assert!(matches!(manager.start(), Err(PoolError::AlreadyStarted)));

        manager.stop().unwrap();
        assert!(!manager.is_running());
        manager.stop().unwrap();
        assert!(matches!(manager.start(), Err(PoolError::Stopped)));
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn sync_calls_all_complete() {
        let tracer = Arc::new(FakeTracer::new(false));
        let counter = Arc::new(AtomicUsize::new(0));

        let manager = Manager::builder()
            .platform(fake_platform())
            .tracer(Arc::clone(&tracer))
            .build();
        manager.start().unwrap();

        let pooled = manager.pool(counting_work(&counter));

        for _ in 0..100 {
            pooled.call(&Context::new()).unwrap();
        }

        assert_eq!(counter.load(Ordering::Relaxed), 100);
        assert_eq!(tracer.span_count(), 100);
        tracer.with_spans(|spans| {
            for span in spans {
                let span = span.lock();
                assert_eq!(span.end_count, 1);
                assert_eq!(span.name, "pool-500");
                assert!(span.attributes.is_empty());
            }
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn recording_tracer_gets_profiler_attributes() {
        let tracer = Arc::new(FakeTracer::new(true));

        let manager = Manager::builder()
            .platform(fake_platform())
            .processors(nonempty![3])
            .tracer(Arc::clone(&tracer))
            .profiler_builder(FakeProfilerBuilder::new())
            .build();
        manager.start().unwrap();

        manager
            .dispatch(&Context::new(), &Poolable::new(|_| Ok(())))
            .unwrap();

        tracer.with_spans(|spans| {
            assert_eq!(
                spans.first().unwrap().lock().attributes,
                vec![("processor".to_owned(), 3)]
            );
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn work_error_reaches_caller_through_adapter() {
        let manager = Manager::builder().platform(fake_platform()).build();
        manager.start().unwrap();

        let pooled = manager.pool(Poolable::new(|_| Err(io::Error::other("bad input").into())));
        let error = pooled.call(&Context::new()).unwrap_err();

        let pool_error = error.downcast_ref::<PoolError>().unwrap();
        assert_eq!(pool_error.work_error().unwrap().to_string(), "bad input");
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn build_failure_aborts_start() {
        let manager = Manager::builder()
            .platform(fake_platform())
            .profiler_builder(FakeProfilerBuilder::new().fail_on(2))
            .build();

        let error = manager.start().unwrap_err();

        assert!(matches!(
            error,
            PoolError::ProfilerBuild {
                processor_id: 2,
                ..
            }
        ));
        assert!(!manager.is_running());
        assert!(matches!(
            manager.dispatch(&Context::new(), &Poolable::new(|_| Ok(()))),
            Err(PoolError::Stopped)
        ));
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn work_queued_before_start_runs_after_start() {
        let counter = Arc::new(AtomicUsize::new(0));

        let manager = Manager::builder()
            .platform(fake_platform())
            .asynchronous(true)
            .build();

        let pooled = manager.pool(counting_work(&counter));
        for _ in 0..10 {
            pooled.call(&Context::new()).unwrap();
        }

        assert_eq!(counter.load(Ordering::Relaxed), 0);

        manager.start().unwrap();

        while counter.load(Ordering::Relaxed) < 10 {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn queued_sync_work_is_abandoned_on_stop() {
        let manager = Arc::new(Manager::builder().platform(fake_platform()).build());

        let submitter = thread::spawn({
            let manager = Arc::clone(&manager);
            move || manager.dispatch(&Context::new(), &Poolable::new(|_| Ok(())))
        });

        while manager.shared.sync_rx.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }

        manager.stop().unwrap();

        assert!(matches!(
            submitter.join().unwrap(),
            Err(PoolError::Abandoned)
        ));
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn submissions_after_stop_are_rejected() {
        let manager = Manager::builder()
            .platform(fake_platform())
            .asynchronous(true)
            .build();
        manager.start().unwrap();

        let pooled = manager.pool(Poolable::new(|_| Ok(())));
        manager.stop().unwrap();

        let error = pooled.call(&Context::new()).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<PoolError>(),
            Some(PoolError::Stopped)
        ));
        assert!(matches!(
            manager.dispatch_detached(&Context::new(), &Poolable::new(|_| Ok(()))),
            Err(PoolError::Stopped)
        ));
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn stop_waits_for_in_flight_work() {
        let finished = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(AtomicUsize::new(0));

        let manager = Manager::builder()
            .platform(fake_platform())
            .processors(nonempty![0])
            .build();
        manager.start().unwrap();

        manager
            .dispatch_detached(
                &Context::new(),
                &Poolable::new({
                    let started = Arc::clone(&started);
                    let finished = Arc::clone(&finished);
                    move |_| {
                        started.fetch_add(1, Ordering::Relaxed);
                        thread::sleep(Duration::from_millis(50));
                        finished.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }
                }),
            )
            .unwrap();

        while started.load(Ordering::Relaxed) == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        manager.stop().unwrap();

        assert_eq!(finished.load(Ordering::Relaxed), 1);
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn adapter_outlives_manager() {
        let manager = Manager::builder().platform(fake_platform()).build();
        manager.start().unwrap();

        let pooled = manager.pool(Poolable::new(|_| Ok(())));
        drop(manager);

        let error = pooled.call(&Context::new()).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<PoolError>(),
            Some(PoolError::Stopped)
        ));
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn slow_builders_are_all_awaited() {
        let builder = Arc::new(FakeProfilerBuilder::new().build_delay(Duration::from_millis(20)));

        let manager = Manager::builder()
            .platform(fake_platform())
            .profiler_builder(Arc::clone(&builder))
            .build();
        manager.start().unwrap();

        assert_eq!(builder.builds().len(), 4);
        assert_eq!(builder.profile_count(), 0);
    }
}

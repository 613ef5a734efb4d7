use std::error::Error;
use std::io;

use thiserror::Error;

use crate::{OsThreadId, ProcessorId, WorkError};

/// Failure to open, control or read performance counters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CounterError {
    /// The operating system refused to open a counter.
    #[error("failed to open {event} counter for thread {thread_id} on processor {processor_id}")]
    Open {
        /// Human-readable name of the event that could not be opened.
        event: String,
        /// Thread the counter was to be bound to.
        thread_id: OsThreadId,
        /// Processor the counter was to be bound to.
        processor_id: ProcessorId,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },

    /// Enabling, disabling or resetting counters failed.
    #[error("failed to {operation} performance counters")]
    Control {
        /// The control operation that failed.
        operation: &'static str,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },

    /// Reading counter values failed.
    #[error("failed to read performance counters")]
    Read(#[source] io::Error),

    /// The kernel returned fewer values than there are counters.
    #[error("performance counter read returned {actual} values, expected {expected}")]
    ShortRead {
        /// Number of counters in the group.
        expected: usize,
        /// Number of values returned.
        actual: usize,
    },

    /// None of the hardware counters could be opened on this processor.
    #[error("no hardware counters are available on processor {processor_id}")]
    NoneAvailable {
        /// Processor the counters were to be bound to.
        processor_id: ProcessorId,
    },

    /// A tracepoint could not be resolved to a kernel event ID.
    #[error("tracepoint {subsystem}:{event} is not available")]
    Tracepoint {
        /// Tracepoint subsystem, e.g. `syscalls`.
        subsystem: String,
        /// Tracepoint name, e.g. `sys_enter_getcwd`.
        event: String,
        /// Underlying error from reading the tracing filesystem.
        #[source]
        source: io::Error,
    },

    /// A counter group was requested with no events in it.
    #[error("a counter group needs at least one event")]
    EmptyGroup,
}

/// Failure while executing a unit of work under a profiler.
///
/// The unit of work's own error is always kept apart from profiling failures, so callers can
/// tell which of the two failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProfileError {
    /// The unit of work failed. Profiling either succeeded or was skipped.
    #[error("unit of work failed")]
    Work(#[source] WorkError),

    /// The unit of work succeeded but the counters could not be reset or read.
    #[error("profiling failed")]
    Counters(#[source] CounterError),

    /// Both the unit of work and the counters failed.
    #[error("unit of work failed and profiling failed")]
    WorkAndCounters {
        /// Error returned by the unit of work.
        work: WorkError,
        /// Error from the counters.
        #[source]
        counters: CounterError,
    },
}

impl ProfileError {
    /// Combines an optional unit-of-work failure with a counter failure.
    pub(crate) fn with_counters(work: Option<WorkError>, counters: CounterError) -> Self {
        match work {
            Some(work) => Self::WorkAndCounters { work, counters },
            None => Self::Counters(counters),
        }
    }

    /// The error returned by the unit of work, if it failed.
    #[must_use]
    pub fn work_error(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match self {
            Self::Work(work) | Self::WorkAndCounters { work, .. } => Some(work.as_ref()),
            Self::Counters(_) => None,
        }
    }

    /// The counter error, if profiling failed.
    #[must_use]
    pub fn counter_error(&self) -> Option<&CounterError> {
        match self {
            Self::Counters(counters) | Self::WorkAndCounters { counters, .. } => Some(counters),
            Self::Work(_) => None,
        }
    }
}

/// Failure reported by the pool [`Manager`][crate::Manager].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The unit of work or its profiler failed.
    #[error(transparent)]
    Profile(#[from] ProfileError),

    /// The unit of work panicked. The worker recovered and remains available.
    #[error("unit of work panicked on processor {processor_id}")]
    WorkPanicked {
        /// Processor of the worker that executed the unit of work.
        processor_id: ProcessorId,
    },

    /// A worker could not build its profiler, so the pool did not start.
    #[error("failed to build profiler for worker on processor {processor_id}")]
    ProfilerBuild {
        /// Processor of the worker whose profiler failed to build.
        processor_id: ProcessorId,
        /// The profiler builder error.
        #[source]
        source: CounterError,
    },

    /// The operating system refused to create a worker thread.
    #[error("failed to spawn worker thread for processor {processor_id}")]
    WorkerSpawn {
        /// Processor the worker was meant for.
        processor_id: ProcessorId,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },

    /// A worker thread terminated abnormally.
    #[error("worker thread for processor {processor_id} terminated abnormally")]
    WorkerLost {
        /// Processor of the lost worker.
        processor_id: ProcessorId,
    },

    /// [`Manager::start()`][crate::Manager::start] was called on a running pool.
    #[error("the pool has already been started")]
    AlreadyStarted,

    /// The pool has been stopped and accepts no more work.
    #[error("the pool has been stopped")]
    Stopped,

    /// The pool stopped before any worker picked up the unit of work.
    #[error("the pool stopped before the unit of work was executed")]
    Abandoned,
}

impl PoolError {
    /// The error returned by the unit of work itself, if that is what failed.
    #[must_use]
    pub fn work_error(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match self {
            Self::Profile(profile) => profile.work_error(),
            _ => None,
        }
    }
}

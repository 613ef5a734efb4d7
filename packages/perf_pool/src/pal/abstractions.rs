#![cfg_attr(
    test,
    expect(
        clippy::struct_field_names,
        reason = "false positive from automock generated code"
    )
)]

use std::fmt::Debug;
use std::io;

use crate::counters::PerfEventAttr;
use crate::{OsThreadId, ProcessorId};

/// Raw file descriptor of an open performance counter.
pub(crate) type CounterFd = i32;

/// Control operations applicable to an open performance counter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CounterControl {
    Enable,
    Disable,
    Reset,
}

impl CounterControl {
    pub(crate) const fn name(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Reset => "reset",
        }
    }
}

/// Operating system capabilities used by the pool and the built-in profilers.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Platform: Debug + Send + Sync + 'static {
    /// Kernel thread ID of the calling thread.
    fn current_thread_id(&self) -> OsThreadId;

    /// Processors the calling thread is allowed to execute on.
    fn current_thread_processors(&self) -> Result<Vec<ProcessorId>, io::Error>;

    /// Restricts the calling thread to the given processors.
    fn pin_current_thread_to(&self, processors: &[ProcessorId]) -> Result<(), io::Error>;

    /// Opens a performance counter bound to a thread and processor, optionally as a member of
    /// the group led by `group_leader`.
    fn open_counter(
        &self,
        attr: &PerfEventAttr,
        thread_id: OsThreadId,
        processor_id: ProcessorId,
        group_leader: Option<CounterFd>,
    ) -> Result<CounterFd, io::Error>;

    /// Applies a control operation to a counter, or to its whole group if `whole_group` is set.
    fn control_counter(
        &self,
        fd: CounterFd,
        control: CounterControl,
        whole_group: bool,
    ) -> Result<(), io::Error>;

    /// Reads counter data into `buffer`, returning the number of 64-bit words read.
    fn read_counter(&self, fd: CounterFd, buffer: &mut [u64]) -> Result<usize, io::Error>;

    fn close_counter(&self, fd: CounterFd);

    /// Whether an error from `open_counter()` means the event is not supported here, as opposed
    /// to a permission or resource problem.
    fn is_unsupported_event(&self, error: &io::Error) -> bool;

    /// Kernel event ID of a tracepoint, from the tracing filesystem.
    fn tracepoint_id(&self, subsystem: &str, event: &str) -> Result<u64, io::Error>;
}

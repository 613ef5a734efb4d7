//! Platform implementation for operating systems without thread affinity or performance counter
//! support wired up. Pinning is treated as a hint that is never applied and every counter
//! operation reports `Unsupported`.

use std::cell::Cell;
use std::io;
use std::sync::atomic::{AtomicI32, Ordering};
use std::thread;

use crate::counters::PerfEventAttr;
use crate::pal::{CounterControl, CounterFd, Platform};
use crate::{OsThreadId, ProcessorId};

pub(crate) static BUILD_TARGET_PLATFORM: BuildTargetPlatform = BuildTargetPlatform;

static NEXT_THREAD_ID: AtomicI32 = AtomicI32::new(1);

thread_local! {
    static THREAD_ID: Cell<OsThreadId> = const { Cell::new(0) };
}

#[derive(Debug, Default)]
pub(crate) struct BuildTargetPlatform;

fn unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "not supported on this operating system",
    )
}

impl Platform for BuildTargetPlatform {
    fn current_thread_id(&self) -> OsThreadId {
        THREAD_ID.with(|id| {
            if id.get() == 0 {
                id.set(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
            }

            id.get()
        })
    }

    fn current_thread_processors(&self) -> Result<Vec<ProcessorId>, io::Error> {
        let count = thread::available_parallelism()?;
        let count = ProcessorId::try_from(count.get())
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;

        Ok((0..count).collect())
    }

    fn pin_current_thread_to(&self, _processors: &[ProcessorId]) -> Result<(), io::Error> {
        Err(unsupported())
    }

    fn open_counter(
        &self,
        _attr: &PerfEventAttr,
        _thread_id: OsThreadId,
        _processor_id: ProcessorId,
        _group_leader: Option<CounterFd>,
    ) -> Result<CounterFd, io::Error> {
        Err(unsupported())
    }

    fn control_counter(
        &self,
        _fd: CounterFd,
        _control: CounterControl,
        _whole_group: bool,
    ) -> Result<(), io::Error> {
        Err(unsupported())
    }

    fn read_counter(&self, _fd: CounterFd, _buffer: &mut [u64]) -> Result<usize, io::Error> {
        Err(unsupported())
    }

    fn close_counter(&self, _fd: CounterFd) {}

    fn is_unsupported_event(&self, error: &io::Error) -> bool {
        error.kind() == io::ErrorKind::Unsupported
    }

    fn tracepoint_id(&self, _subsystem: &str, _event: &str) -> Result<u64, io::Error> {
        Err(unsupported())
    }
}

use std::fmt::{self, Debug};
use std::io;
#[cfg(test)]
use std::sync::Arc;

use crate::counters::PerfEventAttr;
#[cfg(test)]
use crate::pal::MockPlatform;
use crate::pal::{BUILD_TARGET_PLATFORM, BuildTargetPlatform, CounterControl, CounterFd, Platform};
use crate::{OsThreadId, ProcessorId};

/// Enum to hide the real/mock choice behind a single wrapper type.
#[derive(Clone)]
pub(crate) enum PlatformFacade {
    Real(&'static BuildTargetPlatform),

    #[cfg(test)]
    Mock(Arc<MockPlatform>),
}

impl PlatformFacade {
    pub(crate) const fn real() -> Self {
        Self::Real(&BUILD_TARGET_PLATFORM)
    }
}

impl Default for PlatformFacade {
    fn default() -> Self {
        Self::real()
    }
}

#[cfg(test)]
impl From<MockPlatform> for PlatformFacade {
    fn from(mock: MockPlatform) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

impl Platform for PlatformFacade {
    fn current_thread_id(&self) -> OsThreadId {
        match self {
            Self::Real(p) => p.current_thread_id(),
            #[cfg(test)]
            Self::Mock(p) => p.current_thread_id(),
        }
    }

    fn current_thread_processors(&self) -> Result<Vec<ProcessorId>, io::Error> {
        match self {
            Self::Real(p) => p.current_thread_processors(),
            #[cfg(test)]
            Self::Mock(p) => p.current_thread_processors(),
        }
    }

    fn pin_current_thread_to(&self, processors: &[ProcessorId]) -> Result<(), io::Error> {
        match self {
            Self::Real(p) => p.pin_current_thread_to(processors),
            #[cfg(test)]
            Self::Mock(p) => p.pin_current_thread_to(processors),
        }
    }

    fn open_counter(
        &self,
        attr: &PerfEventAttr,
        thread_id: OsThreadId,
        processor_id: ProcessorId,
        group_leader: Option<CounterFd>,
    ) -> Result<CounterFd, io::Error> {
        match self {
            Self::Real(p) => p.open_counter(attr, thread_id, processor_id, group_leader),
            #[cfg(test)]
            Self::Mock(p) => p.open_counter(attr, thread_id, processor_id, group_leader),
        }
    }

    fn control_counter(
        &self,
        fd: CounterFd,
        control: CounterControl,
        whole_group: bool,
    ) -> Result<(), io::Error> {
        match self {
            Self::Real(p) => p.control_counter(fd, control, whole_group),
            #[cfg(test)]
            Self::Mock(p) => p.control_counter(fd, control, whole_group),
        }
    }

    fn read_counter(&self, fd: CounterFd, buffer: &mut [u64]) -> Result<usize, io::Error> {
        match self {
            Self::Real(p) => p.read_counter(fd, buffer),
            #[cfg(test)]
            Self::Mock(p) => p.read_counter(fd, buffer),
        }
    }

    fn close_counter(&self, fd: CounterFd) {
        match self {
            Self::Real(p) => p.close_counter(fd),
            #[cfg(test)]
            Self::Mock(p) => p.close_counter(fd),
        }
    }

    fn is_unsupported_event(&self, error: &io::Error) -> bool {
        match self {
            Self::Real(p) => p.is_unsupported_event(error),
            #[cfg(test)]
            Self::Mock(p) => p.is_unsupported_event(error),
        }
    }

    fn tracepoint_id(&self, subsystem: &str, event: &str) -> Result<u64, io::Error> {
        match self {
            Self::Real(p) => p.tracepoint_id(subsystem, event),
            #[cfg(test)]
            Self::Mock(p) => p.tracepoint_id(subsystem, event),
        }
    }
}

impl Debug for PlatformFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real(p) => p.fmt(f),
            #[cfg(test)]
            Self::Mock(p) => p.fmt(f),
        }
    }
}

use std::ffi::c_void;
use std::path::Path;
use std::{fs, io, mem};

use crate::counters::PerfEventAttr;
use crate::pal::{CounterControl, CounterFd, Platform};
use crate::{OsThreadId, ProcessorId};

pub(crate) static BUILD_TARGET_PLATFORM: BuildTargetPlatform = BuildTargetPlatform;

// _IO('$', 0), _IO('$', 1) and _IO('$', 3) from <linux/perf_event.h>.
const PERF_EVENT_IOC_ENABLE: u64 = 0x2400;
const PERF_EVENT_IOC_DISABLE: u64 = 0x2401;
const PERF_EVENT_IOC_RESET: u64 = 0x2403;
const PERF_IOC_FLAG_GROUP: u64 = 1;

const PERF_FLAG_FD_CLOEXEC: u64 = 1 << 3;

// Newer kernels mount tracefs at the first path, older ones only under debugfs.
const TRACEFS_ROOTS: &[&str] = &["/sys/kernel/tracing", "/sys/kernel/debug/tracing"];

/// Platform implementation that talks to the Linux kernel.
///
/// You would only use a different platform in unit tests that need to use mocks.
#[derive(Debug, Default)]
pub(crate) struct BuildTargetPlatform;

// Real OS calls are excluded from coverage measurement because they are exercised via
// integration tests and error paths require OS-level failures that are impractical to trigger.
#[cfg_attr(coverage_nightly, coverage(off))]
impl Platform for BuildTargetPlatform {
    fn current_thread_id(&self) -> OsThreadId {
        // SAFETY: No safety requirements.
        let tid = unsafe { libc::syscall(libc::SYS_gettid) };

        OsThreadId::try_from(tid).expect("kernel thread IDs always fit in pid_t")
    }

    fn current_thread_processors(&self) -> Result<Vec<ProcessorId>, io::Error> {
        // SAFETY: All zeroes is a valid cpu_set_t.
        let mut cpuset: libc::cpu_set_t = unsafe { mem::zeroed() };

        // 0 means current thread.
        // SAFETY: No safety requirements beyond passing valid arguments.
        let result =
            unsafe { libc::sched_getaffinity(0, size_of::<libc::cpu_set_t>(), &raw mut cpuset) };

        if result != 0 {
            return Err(io::Error::last_os_error());
        }

        let max_processors = ProcessorId::try_from(libc::CPU_SETSIZE)
            .expect("CPU_SETSIZE is a small positive constant");

        Ok((0..max_processors)
            // SAFETY: The index is below CPU_SETSIZE, so it is within the set.
            .filter(|processor_id| unsafe { libc::CPU_ISSET(*processor_id as usize, &cpuset) })
            .collect())
    }

    fn pin_current_thread_to(&self, processors: &[ProcessorId]) -> Result<(), io::Error> {
        // SAFETY: All zeroes is a valid cpu_set_t.
        let mut cpuset: libc::cpu_set_t = unsafe { mem::zeroed() };

        let max_processors = usize::try_from(libc::CPU_SETSIZE)
            .expect("CPU_SETSIZE is a small positive constant");

        for &processor_id in processors {
            let index = processor_id as usize;

            if index >= max_processors {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("processor {processor_id} is beyond the fixed-size CPU set"),
                ));
            }

            // SAFETY: The index was bounds-checked above.
            unsafe {
                libc::CPU_SET(index, &mut cpuset);
            }
        }

        // 0 means current thread.
        // SAFETY: No safety requirements beyond passing valid arguments.
        let result = unsafe { libc::sched_setaffinity(0, size_of::<libc::cpu_set_t>(), &cpuset) };

        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn open_counter(
        &self,
        attr: &PerfEventAttr,
        thread_id: OsThreadId,
        processor_id: ProcessorId,
        group_leader: Option<CounterFd>,
    ) -> Result<CounterFd, io::Error> {
        let cpu = libc::c_int::try_from(processor_id)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;

        // SAFETY: The attribute struct is a valid, fully initialized perf_event_attr whose size
        // field matches its layout. The kernel only reads from it.
        let fd = unsafe {
            libc::syscall(
                libc::SYS_perf_event_open,
                attr as *const PerfEventAttr,
                thread_id,
                cpu,
                group_leader.unwrap_or(-1),
                PERF_FLAG_FD_CLOEXEC as libc::c_ulong,
            )
        };

        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        CounterFd::try_from(fd).map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))
    }

    fn control_counter(
        &self,
        fd: CounterFd,
        control: CounterControl,
        whole_group: bool,
    ) -> Result<(), io::Error> {
        let request = match control {
            CounterControl::Enable => PERF_EVENT_IOC_ENABLE,
            CounterControl::Disable => PERF_EVENT_IOC_DISABLE,
            CounterControl::Reset => PERF_EVENT_IOC_RESET,
        };

        let flags: libc::c_ulong = if whole_group {
            PERF_IOC_FLAG_GROUP as libc::c_ulong
        } else {
            0
        };

        // SAFETY: The perf ioctls used here take an integer argument, not a pointer.
        let result = unsafe { libc::ioctl(fd, request as _, flags) };

        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn read_counter(&self, fd: CounterFd, buffer: &mut [u64]) -> Result<usize, io::Error> {
        // SAFETY: The buffer is valid for writes of its full byte length.
        let bytes = unsafe {
            libc::read(
                fd,
                buffer.as_mut_ptr().cast::<c_void>(),
                size_of_val(buffer),
            )
        };

        let bytes = usize::try_from(bytes).map_err(|_negative| io::Error::last_os_error())?;

        Ok(bytes.checked_div(size_of::<u64>()).unwrap_or_default())
    }

    fn close_counter(&self, fd: CounterFd) {
        // SAFETY: The descriptor is owned by the caller and never used after this call.
        // There is nothing useful to do if close fails.
        unsafe {
            libc::close(fd);
        }
    }

    fn is_unsupported_event(&self, error: &io::Error) -> bool {
        matches!(
            error.raw_os_error(),
            Some(libc::ENOENT | libc::EOPNOTSUPP | libc::EINVAL | libc::ENODEV)
        )
    }

    fn tracepoint_id(&self, subsystem: &str, event: &str) -> Result<u64, io::Error> {
        let mut last_error = io::Error::from(io::ErrorKind::NotFound);

        for root in TRACEFS_ROOTS {
            let path = Path::new(root)
                .join("events")
                .join(subsystem)
                .join(event)
                .join("id");

            match fs::read_to_string(&path) {
                Ok(contents) => {
                    return contents
                        .trim()
                        .parse::<u64>()
                        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error));
                }
                Err(error) => last_error = error,
            }
        }

        Err(last_error)
    }
}

use std::fmt;

use crate::CounterError;
use crate::counters::{
    PERF_TYPE_HARDWARE, PERF_TYPE_SOFTWARE, PERF_TYPE_TRACEPOINT, PerfEventAttr,
};
use crate::pal::{Platform, PlatformFacade};

/// Generalized hardware events, as exposed by the kernel for every supported CPU.
///
/// Not every CPU implements every event. Unsupported events are simply absent from
/// [`HardwareProfile`][crate::HardwareProfile].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum HardwareEvent {
    /// Total cycles. Affected by frequency scaling.
    CpuCycles,
    /// Retired instructions.
    Instructions,
    /// Cache accesses, usually last level cache.
    CacheReferences,
    /// Cache misses, usually last level cache.
    CacheMisses,
    /// Retired branch instructions.
    BranchInstructions,
    /// Mispredicted branch instructions.
    BranchMisses,
    /// Bus cycles, which can be different from total cycles.
    BusCycles,
    /// Stalled cycles during issue.
    StalledCyclesFrontend,
    /// Stalled cycles during retirement.
    StalledCyclesBackend,
    /// Total cycles, not affected by frequency scaling.
    RefCpuCycles,
}

impl HardwareEvent {
    /// Every hardware event, in the order the kernel numbers them.
    pub const ALL: [Self; 10] = [
        Self::CpuCycles,
        Self::Instructions,
        Self::CacheReferences,
        Self::CacheMisses,
        Self::BranchInstructions,
        Self::BranchMisses,
        Self::BusCycles,
        Self::StalledCyclesFrontend,
        Self::StalledCyclesBackend,
        Self::RefCpuCycles,
    ];

    /// The `PERF_COUNT_HW_*` value of the event.
    #[must_use]
    pub const fn config(self) -> u64 {
        match self {
            Self::CpuCycles => 0,
            Self::Instructions => 1,
            Self::CacheReferences => 2,
            Self::CacheMisses => 3,
            Self::BranchInstructions => 4,
            Self::BranchMisses => 5,
            Self::BusCycles => 6,
            Self::StalledCyclesFrontend => 7,
            Self::StalledCyclesBackend => 8,
            Self::RefCpuCycles => 9,
        }
    }

    /// The span attribute key the hardware profiler uses for this event.
    #[must_use]
    pub const fn attribute_key(self) -> &'static str {
        match self {
            Self::CpuCycles => "CPUCycles",
            Self::Instructions => "Instructions",
            Self::CacheReferences => "CacheRefs",
            Self::CacheMisses => "CacheMisses",
            Self::BranchInstructions => "BranchInstr",
            Self::BranchMisses => "BranchMisses",
            Self::BusCycles => "BusCycles",
            Self::StalledCyclesFrontend => "StalledCyclesFrontend",
            Self::StalledCyclesBackend => "StalledCyclesBackend",
            Self::RefCpuCycles => "RefCPUCycles",
        }
    }

    pub(crate) const fn index(self) -> usize {
        self.config() as usize
    }
}

/// Software events counted by the kernel itself.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum SoftwareEvent {
    /// Per-processor high-resolution timer, in nanoseconds.
    CpuClock,
    /// Clock specific to the task that is running, in nanoseconds.
    TaskClock,
    /// Page faults.
    PageFaults,
    /// Context switches.
    ContextSwitches,
    /// Migrations of the task to another processor.
    CpuMigrations,
    /// Minor page faults, which did not require disk I/O.
    MinorPageFaults,
    /// Major page faults, which required disk I/O.
    MajorPageFaults,
    /// Alignment faults.
    AlignmentFaults,
    /// Emulation faults.
    EmulationFaults,
}

impl SoftwareEvent {
    /// The `PERF_COUNT_SW_*` value of the event.
    #[must_use]
    pub const fn config(self) -> u64 {
        match self {
            Self::CpuClock => 0,
            Self::TaskClock => 1,
            Self::PageFaults => 2,
            Self::ContextSwitches => 3,
            Self::CpuMigrations => 4,
            Self::MinorPageFaults => 5,
            Self::MajorPageFaults => 6,
            Self::AlignmentFaults => 7,
            Self::EmulationFaults => 8,
        }
    }
}

/// Describes one event to count with a performance counter.
///
/// # Example
///
/// ```
/// use perf_pool::{EventDescriptor, HardwareEvent, SoftwareEvent};
///
/// let instructions = EventDescriptor::hardware(HardwareEvent::Instructions);
/// let faults = EventDescriptor::software(SoftwareEvent::PageFaults).exclude_kernel(false);
///
/// assert_eq!(instructions.to_string(), "Instructions");
/// assert_eq!(faults.to_string(), "software:2");
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EventDescriptor {
    kind: u32,
    config: u64,
    config1: u64,
    config2: u64,
    exclude_kernel: bool,
    exclude_hypervisor: bool,
    label: String,
}

impl EventDescriptor {
    /// A generalized hardware event, counting user space only.
    #[must_use]
    pub fn hardware(event: HardwareEvent) -> Self {
        Self {
            kind: PERF_TYPE_HARDWARE,
            config: event.config(),
            config1: 0,
            config2: 0,
            exclude_kernel: true,
            exclude_hypervisor: true,
            label: event.attribute_key().to_owned(),
        }
    }

    /// A software event, counting user space only.
    #[must_use]
    pub fn software(event: SoftwareEvent) -> Self {
        Self {
            kind: PERF_TYPE_SOFTWARE,
            config: event.config(),
            config1: 0,
            config2: 0,
            exclude_kernel: true,
            exclude_hypervisor: true,
            label: format!("software:{}", event.config()),
        }
    }

    /// A kernel tracepoint such as `syscalls:sys_enter_getcwd`.
    ///
    /// The tracepoint ID is looked up in the tracing filesystem, which usually requires elevated
    /// privileges.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Tracepoint`] if the tracepoint does not exist or the tracing
    /// filesystem cannot be read.
    pub fn tracepoint(subsystem: &str, event: &str) -> Result<Self, CounterError> {
        Self::tracepoint_with(&PlatformFacade::real(), subsystem, event)
    }

    pub(crate) fn tracepoint_with(
        platform: &PlatformFacade,
        subsystem: &str,
        event: &str,
    ) -> Result<Self, CounterError> {
        let id = platform
            .tracepoint_id(subsystem, event)
            .map_err(|source| CounterError::Tracepoint {
                subsystem: subsystem.to_owned(),
                event: event.to_owned(),
                source,
            })?;

        Ok(Self {
            kind: PERF_TYPE_TRACEPOINT,
            config: id,
            config1: 0,
            config2: 0,
            exclude_kernel: false,
            exclude_hypervisor: true,
            label: format!("{subsystem}:{event}"),
        })
    }

    /// An event given directly by its `perf_event_attr` type and config values.
    ///
    /// Use this for raw PMU events, cache events or dynamic PMUs such as kprobes.
    #[must_use]
    pub fn raw(kind: u32, config: u64) -> Self {
        Self {
            kind,
            config,
            config1: 0,
            config2: 0,
            exclude_kernel: false,
            exclude_hypervisor: true,
            label: format!("raw:{kind}:{config:#x}"),
        }
    }

    /// Sets the `config1` and `config2` extension values of the event.
    #[must_use]
    pub fn extended_config(mut self, config1: u64, config2: u64) -> Self {
        self.config1 = config1;
        self.config2 = config2;
        self
    }

    /// Whether to exclude events that happen in the kernel.
    #[must_use]
    pub fn exclude_kernel(mut self, exclude: bool) -> Self {
        self.exclude_kernel = exclude;
        self
    }

    /// Whether to exclude events that happen in the hypervisor.
    #[must_use]
    pub fn exclude_hypervisor(mut self, exclude: bool) -> Self {
        self.exclude_hypervisor = exclude;
        self
    }

    pub(crate) fn to_attr(&self, read_format: u64, disabled: bool) -> PerfEventAttr {
        let mut attr = PerfEventAttr::new(self.kind, self.config);
        attr.config1 = self.config1;
        attr.config2 = self.config2;
        attr.read_format = read_format;
        attr.set_disabled(disabled);
        attr.set_exclude_kernel(self.exclude_kernel);
        attr.set_exclude_hv(self.exclude_hypervisor);
        attr
    }
}

impl fmt::Display for EventDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

use std::fmt;

use tracing::debug;

use crate::counters::{EventDescriptor, HardwareEvent};
use crate::pal::{CounterControl, CounterFd, Platform, PlatformFacade};
use crate::{CounterError, OsThreadId, ProcessorId};

/// The generalized hardware counters of one thread on one processor.
///
/// Every [`HardwareEvent`] gets its own counter. Events the processor does not implement are
/// skipped when opening, so a profile may contain only some of them.
///
/// The counters are created disabled. Call [`enable()`][Self::enable] to start counting.
pub struct HardwareCounters {
    platform: PlatformFacade,
    counters: Vec<(HardwareEvent, CounterFd)>,
}

impl HardwareCounters {
    /// Opens every supported hardware counter for the given thread and processor.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Open`] if a counter fails for a reason other than the event being
    /// unsupported (e.g. missing permissions) and [`CounterError::NoneAvailable`] if the processor
    /// supports none of the events.
    pub fn open(thread_id: OsThreadId, processor_id: ProcessorId) -> Result<Self, CounterError> {
        Self::open_with(PlatformFacade::real(), thread_id, processor_id)
    }

    pub(crate) fn open_with(
        platform: PlatformFacade,
        thread_id: OsThreadId,
        processor_id: ProcessorId,
    ) -> Result<Self, CounterError> {
        let mut result = Self {
            platform,
            counters: Vec::with_capacity(HardwareEvent::ALL.len()),
        };

        for event in HardwareEvent::ALL {
            let attr = EventDescriptor::hardware(event).to_attr(0, true);

            match result
                .platform
                .open_counter(&attr, thread_id, processor_id, None)
            {
                Ok(fd) => result.counters.push((event, fd)),
                Err(error) if result.platform.is_unsupported_event(&error) => {
                    debug!(
                        processor_id,
                        event = event.attribute_key(),
                        %error,
                        "hardware event not supported"
                    );
                }
                Err(source) => {
                    return Err(CounterError::Open {
                        event: event.attribute_key().to_owned(),
                        thread_id,
                        processor_id,
                        source,
                    });
                }
            }
        }

        if result.counters.is_empty() {
            return Err(CounterError::NoneAvailable { processor_id });
        }

        Ok(result)
    }

    /// The events that are being counted.
    pub fn events(&self) -> impl Iterator<Item = HardwareEvent> + '_ {
        self.counters.iter().map(|(event, _)| *event)
    }

    /// Starts counting.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Control`] if the operating system rejects the request.
    pub fn enable(&self) -> Result<(), CounterError> {
        self.control(CounterControl::Enable)
    }

    /// Sets every counter back to zero.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Control`] if the operating system rejects the request.
    pub fn reset(&self) -> Result<(), CounterError> {
        self.control(CounterControl::Reset)
    }

    fn control(&self, control: CounterControl) -> Result<(), CounterError> {
        for (_, fd) in &self.counters {
            self.platform
                .control_counter(*fd, control, false)
                .map_err(|source| CounterError::Control {
                    operation: control.name(),
                    source,
                })?;
        }

        Ok(())
    }

    /// Reads the current value of every counter.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Read`] if any read fails.
    pub fn read(&self) -> Result<HardwareProfile, CounterError> {
        let mut profile = HardwareProfile::default();

        for (event, fd) in &self.counters {
            let mut buffer = [0_u64; 1];

            let words = self
                .platform
                .read_counter(*fd, &mut buffer)
                .map_err(CounterError::Read)?;

            if words != 1 {
                return Err(CounterError::ShortRead {
                    expected: 1,
                    actual: words,
                });
            }

            let [value] = buffer;
            profile.set(*event, value);
        }

        Ok(profile)
    }
}

impl Drop for HardwareCounters {
    fn drop(&mut self) {
        for (_, fd) in self.counters.drain(..) {
            self.platform.close_counter(fd);
        }
    }
}

impl fmt::Debug for HardwareCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareCounters")
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

/// One reading of [`HardwareCounters`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HardwareProfile {
    values: [Option<u64>; HardwareEvent::ALL.len()],
}

impl HardwareProfile {
    /// The value of one event, or `None` if the processor does not support it.
    #[must_use]
    pub fn get(&self, event: HardwareEvent) -> Option<u64> {
        self.values.get(event.index()).copied().flatten()
    }

    /// Every event that has a value, in kernel order.
    pub fn iter(&self) -> impl Iterator<Item = (HardwareEvent, u64)> + '_ {
        HardwareEvent::ALL
            .iter()
            .filter_map(|event| self.get(*event).map(|value| (*event, value)))
    }

    pub(crate) fn set(&mut self, event: HardwareEvent, value: u64) {
        if let Some(slot) = self.values.get_mut(event.index()) {
            *slot = Some(value);
        }
    }
}

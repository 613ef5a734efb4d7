use std::fmt;

use crate::counters::{EventDescriptor, PERF_FORMAT_GROUP};
use crate::pal::{CounterControl, CounterFd, Platform, PlatformFacade};
use crate::{CounterError, OsThreadId, ProcessorId};

/// A set of performance counters that are enabled, reset and read together.
///
/// The first event is the group leader. The kernel schedules all members of a group onto the
/// PMU at the same time, so the values returned by [`read()`][Self::read] all cover exactly the
/// same interval.
///
/// The group is created disabled. Call [`enable()`][Self::enable] to start counting.
///
/// Counter file descriptors are closed when the group is dropped.
pub struct CounterGroup {
    platform: PlatformFacade,

    leader: CounterFd,
    members: Vec<CounterFd>,

    // PERF_FORMAT_GROUP layout: [nr, value_0, value_1, ...].
    buffer: Vec<u64>,
}

impl CounterGroup {
    /// Opens one counter per event, all bound to the given thread and processor.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::EmptyGroup`] if `events` is empty and [`CounterError::Open`] if
    /// any of the counters cannot be opened. Counters opened before the failure are closed.
    pub fn open(
        events: &[EventDescriptor],
        thread_id: OsThreadId,
        processor_id: ProcessorId,
    ) -> Result<Self, CounterError> {
        Self::open_with(PlatformFacade::real(), events, thread_id, processor_id)
    }

    pub(crate) fn open_with(
        platform: PlatformFacade,
        events: &[EventDescriptor],
        thread_id: OsThreadId,
        processor_id: ProcessorId,
    ) -> Result<Self, CounterError> {
        let (leader_event, member_events) = events.split_first().ok_or(CounterError::EmptyGroup)?;

        let open_error = |event: &EventDescriptor, source| CounterError::Open {
            event: event.to_string(),
            thread_id,
            processor_id,
            source,
        };

        let leader_attr = leader_event.to_attr(PERF_FORMAT_GROUP, true);
        let leader = platform
            .open_counter(&leader_attr, thread_id, processor_id, None)
            .map_err(|source| open_error(leader_event, source))?;

        let mut group = Self {
            platform,
            leader,
            members: Vec::with_capacity(member_events.len()),
            buffer: vec![0; events.len() + 1],
        };

        for event in member_events {
            // Members follow the leader's enabled state, so they are opened enabled.
            let attr = event.to_attr(PERF_FORMAT_GROUP, false);

            // On failure, dropping `group` closes everything opened so far.
            let fd = group
                .platform
                .open_counter(&attr, thread_id, processor_id, Some(leader))
                .map_err(|source| open_error(event, source))?;

            group.members.push(fd);
        }

        Ok(group)
    }

    /// Number of counters in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len() + 1
    }

    /// Always `false`; a group contains at least its leader.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Starts counting on every counter in the group.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Control`] if the operating system rejects the request.
    pub fn enable(&self) -> Result<(), CounterError> {
        self.control(CounterControl::Enable)
    }

    /// Stops counting on every counter in the group. Values are kept.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Control`] if the operating system rejects the request.
    pub fn disable(&self) -> Result<(), CounterError> {
        self.control(CounterControl::Disable)
    }

    /// Sets every counter in the group back to zero.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Control`] if the operating system rejects the request.
    pub fn reset(&self) -> Result<(), CounterError> {
        self.control(CounterControl::Reset)
    }

    fn control(&self, control: CounterControl) -> Result<(), CounterError> {
        self.platform
            .control_counter(self.leader, control, true)
            .map_err(|source| CounterError::Control {
                operation: control.name(),
                source,
            })
    }

    /// Reads the current value of every counter, in the order the events were given.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Read`] if the read fails and [`CounterError::ShortRead`] if the
    /// kernel returns fewer values than there are counters.
    pub fn read(&mut self) -> Result<&[u64], CounterError> {
        let expected = self.len();

        let words = self
            .platform
            .read_counter(self.leader, &mut self.buffer)
            .map_err(CounterError::Read)?;

        let actual = match self.buffer.first() {
            Some(&nr) if words > 0 => usize::try_from(nr).unwrap_or(usize::MAX),
            _ => 0,
        };

        if actual != expected || words < expected + 1 {
            return Err(CounterError::ShortRead {
                expected,
                actual: actual.min(words.saturating_sub(1)),
            });
        }

        Ok(self
            .buffer
            .get(1..=expected)
            .expect("buffer is sized for the group when the group is opened"))
    }
}

impl Drop for CounterGroup {
    fn drop(&mut self) {
        for fd in self.members.drain(..) {
            self.platform.close_counter(fd);
        }

        self.platform.close_counter(self.leader);
    }
}

impl fmt::Debug for CounterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterGroup")
            .field("leader", &self.leader)
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use mockall::Sequence;
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::counters::{HardwareEvent, PerfEventAttr, SoftwareEvent};
    use crate::pal::MockPlatform;

    assert_impl_all!(CounterGroup: Send);

    fn two_events() -> Vec<EventDescriptor> {
        vec![
            EventDescriptor::hardware(HardwareEvent::Instructions),
            EventDescriptor::software(SoftwareEvent::PageFaults),
        ]
    }

    #[test]
    fn empty_group_is_rejected() {
        let platform = MockPlatform::new();

        let error = CounterGroup::open_with(platform.into(), &[], 1, 0).unwrap_err();

        assert!(matches!(error, CounterError::EmptyGroup));
    }

    #[test]
    fn leader_is_disabled_and_members_join_its_group() {
        let mut platform = MockPlatform::new();
        let mut seq = Sequence::new();

        platform
            .expect_open_counter()
            .withf(|attr: &PerfEventAttr, thread_id, processor_id, leader| {
                attr.is_disabled()
                    && attr.read_format == PERF_FORMAT_GROUP
                    && *thread_id == 42
                    && *processor_id == 3
                    && leader.is_none()
            })
            .once()
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(10));

        platform
            .expect_open_counter()
            .withf(|attr: &PerfEventAttr, _, _, leader| {
                !attr.is_disabled() && *leader == Some(10)
            })
            .once()
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(11));

        platform
            .expect_close_counter()
            .withf(|fd| *fd == 11)
            .once()
            .in_sequence(&mut seq)
            .return_const(());

        platform
            .expect_close_counter()
            .withf(|fd| *fd == 10)
            .once()
            .in_sequence(&mut seq)
            .return_const(());

        let group = CounterGroup::open_with(platform.into(), &two_events(), 42, 3).unwrap();

        assert_eq!(group.len(), 2);
    }

    #[test]
    fn failed_member_closes_leader() {
        let mut platform = MockPlatform::new();

        platform
            .expect_open_counter()
            .withf(|_, _, _, leader| leader.is_none())
            .returning(|_, _, _, _| Ok(10));

        platform
            .expect_open_counter()
            .withf(|_, _, _, leader| leader.is_some())
            .returning(|_, _, _, _| Err(io::Error::from_raw_os_error(13)));

        platform
            .expect_close_counter()
            .withf(|fd| *fd == 10)
            .once()
            .return_const(());

        let error = CounterGroup::open_with(platform.into(), &two_events(), 1, 0).unwrap_err();

        assert!(matches!(error, CounterError::Open { ref event, .. } if event == "software:2"));
    }

    #[test]
    fn control_applies_to_whole_group() {
        let mut platform = MockPlatform::new();
        let mut seq = Sequence::new();

        platform.expect_open_counter().returning(|_, _, _, _| Ok(5));

        for control in [
            CounterControl::Reset,
            CounterControl::Enable,
            CounterControl::Disable,
        ] {
            platform
                .expect_control_counter()
                .withf(move |fd, c, whole_group| *fd == 5 && *c == control && *whole_group)
                .once()
                .in_sequence(&mut seq)
                .returning(|_, _, _| Ok(()));
        }

        platform.expect_close_counter().return_const(());

        let group = CounterGroup::open_with(
            platform.into(),
            &[EventDescriptor::hardware(HardwareEvent::CpuCycles)],
            1,
            0,
        )
        .unwrap();

        group.reset().unwrap();
        group.enable().unwrap();
        group.disable().unwrap();
    }

    #[test]
    fn control_failure_names_operation() {
        let mut platform = MockPlatform::new();

        platform.expect_open_counter().returning(|_, _, _, _| Ok(5));
        platform
            .expect_control_counter()
            .returning(|_, _, _| Err(io::Error::from_raw_os_error(9)));
        platform.expect_close_counter().return_const(());

        let group = CounterGroup::open_with(
            platform.into(),
            &[EventDescriptor::hardware(HardwareEvent::CpuCycles)],
            1,
            0,
        )
        .unwrap();

        let error = group.reset().unwrap_err();

        assert!(matches!(error, CounterError::Control { operation: "reset", .. }));
    }

    #[test]
    fn read_returns_values_in_event_order() {
        let mut platform = MockPlatform::new();
        let mut next_fd = 20;

        platform.expect_open_counter().returning(move |_, _, _, _| {
            next_fd += 1;
            Ok(next_fd)
        });
        platform
            .expect_read_counter()
            .withf(|fd, _| *fd == 21)
            .returning(|_, buffer: &mut [u64]| {
                buffer.copy_from_slice(&[2, 5, 7]);
                Ok(3)
            });
        platform.expect_close_counter().return_const(());

        let mut group = CounterGroup::open_with(platform.into(), &two_events(), 1, 0).unwrap();

        assert_eq!(group.read().unwrap(), &[5, 7]);
    }

    #[test]
    fn short_read_is_an_error() {
        let mut platform = MockPlatform::new();

        platform.expect_open_counter().returning(|_, _, _, _| Ok(1));
        platform
            .expect_read_counter()
            .returning(|_, buffer: &mut [u64]| {
                buffer[0] = 1;
                buffer[1] = 5;
                Ok(2)
            });
        platform.expect_close_counter().return_const(());

        let mut group = CounterGroup::open_with(platform.into(), &two_events(), 1, 0).unwrap();

        let error = group.read().unwrap_err();

        assert!(matches!(
            error,
            CounterError::ShortRead {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn read_failure_is_an_error() {
        let mut platform = MockPlatform::new();

        platform.expect_open_counter().returning(|_, _, _, _| Ok(1));
        platform
            .expect_read_counter()
            .returning(|_, _| Err(io::Error::from_raw_os_error(5)));
        platform.expect_close_counter().return_const(());

        let mut group = CounterGroup::open_with(
            platform.into(),
            &[EventDescriptor::hardware(HardwareEvent::CpuCycles)],
            1,
            0,
        )
        .unwrap();

        assert!(matches!(group.read(), Err(CounterError::Read(_))));
    }
}

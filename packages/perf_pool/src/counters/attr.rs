// Layout and constants from <linux/perf_event.h>.

pub(crate) const PERF_TYPE_HARDWARE: u32 = 0;
pub(crate) const PERF_TYPE_SOFTWARE: u32 = 1;
pub(crate) const PERF_TYPE_TRACEPOINT: u32 = 2;

pub(crate) const PERF_FORMAT_GROUP: u64 = 1 << 3;

const FLAG_DISABLED: u64 = 1 << 0;
const FLAG_EXCLUDE_KERNEL: u64 = 1 << 5;
const FLAG_EXCLUDE_HV: u64 = 1 << 6;

// PERF_ATTR_SIZE_VER1, the first layout that includes config2.
const PERF_ATTR_SIZE_VER1: u32 = 72;

/// The leading part of `struct perf_event_attr`, up to and including `config2`.
///
/// The kernel accepts any historical size of the struct, identified by the `size` field, and
/// treats the fields we do not pass as zero.
#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct PerfEventAttr {
    pub(crate) kind: u32,
    pub(crate) size: u32,
    pub(crate) config: u64,
    pub(crate) sample_period: u64,
    pub(crate) sample_type: u64,
    pub(crate) read_format: u64,
    pub(crate) flags: u64,
    pub(crate) wakeup_events: u32,
    pub(crate) bp_type: u32,
    pub(crate) config1: u64,
    pub(crate) config2: u64,
}

impl PerfEventAttr {
    pub(crate) const fn new(kind: u32, config: u64) -> Self {
        Self {
            kind,
            size: PERF_ATTR_SIZE_VER1,
            config,
            sample_period: 0,
            sample_type: 0,
            read_format: 0,
            flags: 0,
            wakeup_events: 0,
            bp_type: 0,
            config1: 0,
            config2: 0,
        }
    }

    fn set_flag(&mut self, flag: u64, value: bool) {
        if value {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    pub(crate) fn set_disabled(&mut self, value: bool) {
        self.set_flag(FLAG_DISABLED, value);
    }

    pub(crate) fn set_exclude_kernel(&mut self, value: bool) {
        self.set_flag(FLAG_EXCLUDE_KERNEL, value);
    }

    pub(crate) fn set_exclude_hv(&mut self, value: bool) {
        self.set_flag(FLAG_EXCLUDE_HV, value);
    }

    pub(crate) const fn is_disabled(&self) -> bool {
        self.flags & FLAG_DISABLED != 0
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_eq_size;

    use super::*;

    assert_eq_size!(PerfEventAttr, [u8; PERF_ATTR_SIZE_VER1 as usize]);

    #[test]
    fn new_sets_size_and_no_flags() {
        let attr = PerfEventAttr::new(PERF_TYPE_SOFTWARE, 3);

        assert_eq!(attr.size, PERF_ATTR_SIZE_VER1);
        assert_eq!(attr.config, 3);
        assert_eq!(attr.flags, 0);
    }

    #[test]
    fn flags_are_set_and_cleared() {
        let mut attr = PerfEventAttr::new(PERF_TYPE_HARDWARE, 0);

        attr.set_disabled(true);
        attr.set_exclude_kernel(true);
        attr.set_exclude_hv(true);
        assert_eq!(attr.flags, 0b110_0001);
        assert!(attr.is_disabled());

        attr.set_disabled(false);
        assert_eq!(attr.flags, 0b110_0000);
        assert!(!attr.is_disabled());
    }
}

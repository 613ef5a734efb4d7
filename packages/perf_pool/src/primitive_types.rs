/// Logical processor index, as assigned by the operating system.
///
/// This is the index used for thread affinity and for binding performance counters to a
/// processor. On Linux it is the bit index in a `cpu_set_t`.
pub type ProcessorId = u32;

/// Operating system thread identifier.
///
/// On Linux this is the kernel thread ID returned by `gettid()`, which is what performance
/// counters are bound to. It is unrelated to [`std::thread::ThreadId`].
pub type OsThreadId = i32;

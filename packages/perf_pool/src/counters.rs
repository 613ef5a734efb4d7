//! Performance counters backed by the Linux `perf_event_open(2)` interface.
//!
//! Counters are always bound to one thread on one processor, which is how the pool's workers
//! use them: each worker opens its own counters after pinning itself.

mod attr;
pub(crate) use attr::*;

mod event;
pub use event::*;

mod group;
pub use group::*;

mod hardware;
pub use hardware::*;

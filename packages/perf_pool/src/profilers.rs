//! Built-in [`Profiler`][crate::Profiler] implementations.

mod group;
pub use group::*;

mod hardware;
pub use hardware::*;

mod noop;
pub use noop::*;

use crate::{Context, CounterError, Poolable, ProfileError, Span};

/// Counters that can be zeroed before a unit of work and attached to its span afterwards.
pub(crate) trait CounterSource {
    fn reset_counters(&mut self) -> Result<(), CounterError>;

    /// Reads the counters and writes them to the span as attributes.
    fn attach_counters(&mut self, span: &mut dyn Span) -> Result<(), CounterError>;
}

/// The reset/execute/read/attach sequence shared by the counter-based profilers.
///
/// Nothing touches the counters or the span if the span is not recording. The unit of work is
/// executed even if the reset fails, in which case nothing is read.
pub(crate) fn profile_counted(
    source: &mut impl CounterSource,
    return_on_error: bool,
    cx: &Context,
    span: &mut dyn Span,
    work: &Poolable,
) -> Result<(), ProfileError> {
    if !span.is_recording_events() {
        return work.call(cx).map_err(ProfileError::Work);
    }

    let reset = source.reset_counters();
    let outcome = work.call(cx);

    if let Err(counters) = reset {
        return Err(ProfileError::with_counters(outcome.err(), counters));
    }

    let outcome = match outcome {
        Err(work) if return_on_error => return Err(ProfileError::Work(work)),
        outcome => outcome,
    };

    match (outcome, source.attach_counters(span)) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(work), Ok(())) => Err(ProfileError::Work(work)),
        (outcome, Err(counters)) => Err(ProfileError::with_counters(outcome.err(), counters)),
    }
}

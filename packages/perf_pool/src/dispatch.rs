//! Records passed from submitters to workers over the shared channels.

use std::time::Instant;

use crate::{Context, PoolError, Poolable};

/// A unit of work whose submitter blocks until a worker reports the outcome.
pub(crate) struct SyncDispatch {
    pub(crate) cx: Context,
    pub(crate) work: Poolable,
    pub(crate) completion: oneshot::Sender<Result<(), PoolError>>,
    pub(crate) enqueued_at: Instant,
}

impl SyncDispatch {
    pub(crate) fn new(
        cx: &Context,
        work: &Poolable,
    ) -> (Self, oneshot::Receiver<Result<(), PoolError>>) {
        let (completion, outcome) = oneshot::channel();

        let dispatch = Self {
            cx: cx.clone(),
            work: work.clone(),
            completion,
            enqueued_at: Instant::now(),
        };

        (dispatch, outcome)
    }

    /// Releases the submitter with the given outcome.
    ///
    /// Returns `false` if the submitter is no longer waiting.
    pub(crate) fn complete(self, outcome: Result<(), PoolError>) -> bool {
        self.completion.send(outcome).is_ok()
    }
}

/// A unit of work whose outcome nobody waits for.
pub(crate) struct AsyncDispatch {
    pub(crate) cx: Context,
    pub(crate) work: Poolable,
    pub(crate) enqueued_at: Instant,
}

impl AsyncDispatch {
    pub(crate) fn new(cx: &Context, work: &Poolable) -> Self {
        Self {
            cx: cx.clone(),
            work: work.clone(),
            enqueued_at: Instant::now(),
        }
    }
}

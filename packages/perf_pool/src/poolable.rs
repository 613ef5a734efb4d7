use std::any::type_name;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

pub use opentelemetry::Context;

/// Error returned by a unit of work.
pub type WorkError = Box<dyn Error + Send + Sync + 'static>;

/// Outcome of executing a unit of work.
pub type WorkResult = Result<(), WorkError>;

/// A unit of work that can be executed by the pool.
///
/// The function receives the request [`Context`] it was submitted with (extended with the span
/// the worker started for it, if the tracer supports that) and may fail with any error.
///
/// Cloning is cheap; all clones refer to the same function.
///
/// # Example
///
/// ```
/// use perf_pool::{Context, Poolable};
///
/// let work = Poolable::new(|_cx| {
///     let total: u64 = (1..=100).sum();
///     assert_eq!(total, 5050);
///     Ok(())
/// });
///
/// work.call(&Context::new()).unwrap();
/// ```
#[derive(Clone)]
pub struct Poolable {
    function: Arc<dyn Fn(&Context) -> WorkResult + Send + Sync>,
}

impl Poolable {
    /// Wraps a function as a unit of work.
    #[must_use]
    pub fn new<F>(function: F) -> Self
    where
        F: Fn(&Context) -> WorkResult + Send + Sync + 'static,
    {
        Self {
            function: Arc::new(function),
        }
    }

    /// Executes the unit of work on the current thread.
    ///
    /// # Errors
    ///
    /// Returns whatever error the wrapped function returns.
    pub fn call(&self, cx: &Context) -> WorkResult {
        (self.function)(cx)
    }
}

impl fmt::Debug for Poolable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>()).finish_non_exhaustive()
    }
}

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for tests, benchmarks and demos in the `perf_pool` workspace.

use std::sync::{Once, mpsc};
use std::thread;
use std::time::Duration;

use tracing::Level;

/// How long [`with_watchdog()`] lets a test run before declaring it hung.
///
/// Pool tests spin up one thread per processor and wait for all of them, which can take a
/// while on large machines under load.
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs a test on a separate thread and fails it if it does not finish within
/// [`WATCHDOG_TIMEOUT`].
///
/// A test that deadlocks the pool would otherwise hang the whole test run.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled and
/// the test function is executed directly, so that hanging mutations are detected as such.
///
/// # Panics
///
/// Panics if the test exceeds the timeout. Panics inside the test are propagated.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    with_watchdog_timeout(WATCHDOG_TIMEOUT, test_fn)
}

/// Like [`with_watchdog()`] but with a caller-chosen timeout.
///
/// # Panics
///
/// Panics if the test exceeds the timeout. Panics inside the test are propagated.
pub fn with_watchdog_timeout<F, R>(timeout: Duration, test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the watchdog has already given up on us.
        drop(tx.send(result));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("test thread sent its result and cannot panic after that");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded {timeout:?} timeout");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("test thread disconnected unexpectedly"),
            Err(payload) => std::panic::resume_unwind(payload),
        },
    }
}

/// Installs a `tracing` subscriber that writes to the test output capture.
///
/// Safe to call from every test; only the first call has an effect. Set `PERF_POOL_TRACE=1` to
/// include `trace` level events.
pub fn init_tracing() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let level = if std::env::var("PERF_POOL_TRACE").as_deref() == Ok("1") {
            Level::TRACE
        } else {
            Level::DEBUG
        };

        // Another subscriber may already be installed by the test harness; that one wins.
        _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(level)
            .try_init();
    });
}

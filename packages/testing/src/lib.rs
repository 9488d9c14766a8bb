#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing the `signal_once` packages.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// How long a test may run before the watchdog gives up on it.
///
/// Some strategies under test hang forever when broken, so every threaded test needs a bound.
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs a test with a [`DEFAULT_WATCHDOG_TIMEOUT`] bound to prevent infinite hangs.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog
/// is disabled and the test function is executed directly. This allows mutation
/// testing to properly detect hanging mutations.
///
/// # Panics
///
/// Panics if the test exceeds the timeout (when not in mutation testing mode). Panics from
/// the test itself are propagated unchanged.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 2 + 2);
/// assert_eq!(answer, 4);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    with_watchdog_timeout(DEFAULT_WATCHDOG_TIMEOUT, test_fn)
}

/// Runs a test with a custom timeout to prevent infinite hangs.
///
/// Use this for tests that legitimately take longer than [`DEFAULT_WATCHDOG_TIMEOUT`], such
/// as stress runs with many repetitions.
///
/// # Panics
///
/// Panics if the test exceeds `timeout` (when not in mutation testing mode). Panics from
/// the test itself are propagated unchanged.
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
            test_handle.join().expect("Test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("Test exceeded {timeout:?} timeout - likely hanging in a wait");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            // The test thread panicked, join it to get the panic.
            match test_handle.join() {
                Ok(()) => panic!("Test thread disconnected unexpectedly"),
                Err(e) => std::panic::resume_unwind(e),
            }
        }
    }
}

//! Signaling through a bare condition variable.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::{Error, Result, SignalHandle, Strategy, WaitHandle};

/// Delivers the signal as a condition variable notification, with no flag recording that the
/// signal happened.
///
/// This strategy is only correct if the waiter is already blocked when the signal is sent. If
/// [`signal()`][SignalHandle::signal] completes before [`wait()`][WaitHandle::wait] starts
/// blocking, the notification is lost and an unbounded wait blocks forever. Only ever use it
/// through [`wait_timeout()`][WaitHandle::wait_timeout], which turns the lost wakeup into
/// [`Error::TimedOut`].
///
/// Repeated signals are not detected; each one is just another notification.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use signal_once::{PredicateWait, SignalHandle, Strategy, WaitHandle};
///
/// let (signal, wait) = PredicateWait::create();
///
/// // Nobody is waiting yet, so this notification goes nowhere.
/// signal.signal().unwrap();
///
/// assert!(wait.wait_timeout(Duration::from_millis(10)).is_err());
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub struct PredicateWait;

impl Strategy for PredicateWait {
    const NAME: &'static str = "predicate-wait";

    type Signal = PredicateSignalHandle;
    type Wait = PredicateWaitHandle;

    fn create() -> (Self::Signal, Self::Wait) {
        let shared = Arc::new(Shared::default());

        (
            PredicateSignalHandle {
                shared: Arc::clone(&shared),
            },
            PredicateWaitHandle { shared },
        )
    }
}

// The mutex guards nothing. It exists only because a condition variable wait requires one.
#[derive(Debug, Default)]
struct Shared {
    lock: Mutex<()>,
    condvar: Condvar,
}

/// Producer endpoint of [`PredicateWait`].
#[derive(Debug)]
pub struct PredicateSignalHandle {
    shared: Arc<Shared>,
}

impl SignalHandle for PredicateSignalHandle {
    #[cfg_attr(test, mutants::skip)] // Removing the notification only causes test timeouts.
    fn signal(&self) -> Result<()> {
        let _guard = self.shared.lock.lock();
        let woke_waiter = self.shared.condvar.notify_one();

        trace!(woke_waiter, "predicate wait notified");

        Ok(())
    }
}

/// Consumer endpoint of [`PredicateWait`].
#[derive(Debug)]
pub struct PredicateWaitHandle {
    shared: Arc<Shared>,
}

impl WaitHandle for PredicateWaitHandle {
    fn wait_armed(&self, timeout: Option<Duration>, on_armed: &mut dyn FnMut()) -> Result<()> {
        let mut guard = self.shared.lock.lock();
        on_armed();

        // No predicate: the first wakeup ends the wait, whatever caused it.
        match timeout {
            None => {
                self.shared.condvar.wait(&mut guard);
                Ok(())
            }
            Some(timeout) => {
                if self.shared.condvar.wait_for(&mut guard, timeout).timed_out() {
                    Err(Error::TimedOut { timeout })
                } else {
                    Ok(())
                }
            }
        }
    }
}

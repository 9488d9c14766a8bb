//! Signaling through a mutex-protected flag plus a condition variable.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::{Error, Result, SignalHandle, Strategy, WaitHandle};

/// Delivers the signal by setting a flag under a mutex and then notifying a condition
/// variable; the waiter re-checks the flag under the same mutex before every block.
///
/// This closes the lost-wakeup race of [`PredicateWait`][crate::PredicateWait]: if the flag is
/// already set when the wait starts, the wait returns without blocking. A wakeup with the flag
/// still unset puts the waiter back to sleep instead of returning early.
///
/// A wait returns if and only if a signal has set the flag. Repeated signals are not detected.
///
/// # Example
///
/// ```rust
/// use signal_once::{GuardedFlagWait, SignalHandle, Strategy, WaitHandle};
///
/// let (signal, wait) = GuardedFlagWait::create();
///
/// signal.signal().unwrap();
///
/// assert!(wait.is_signaled());
/// wait.wait().unwrap();
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub struct GuardedFlagWait;

impl Strategy for GuardedFlagWait {
    const NAME: &'static str = "guarded-flag-wait";

    type Signal = GuardedSignalHandle;
    type Wait = GuardedWaitHandle;

    fn create() -> (Self::Signal, Self::Wait) {
        let shared = Arc::new(Shared::default());

        (
            GuardedSignalHandle {
                shared: Arc::clone(&shared),
            },
            GuardedWaitHandle { shared },
        )
    }
}

#[derive(Debug, Default)]
struct Shared {
    // Only ever read or written with the lock held, including for diagnostics.
    fired: Mutex<bool>,
    condvar: Condvar,
}

impl Shared {
    fn is_signaled(&self) -> bool {
        *self.fired.lock()
    }
}

/// Producer endpoint of [`GuardedFlagWait`].
#[derive(Debug)]
pub struct GuardedSignalHandle {
    shared: Arc<Shared>,
}

impl GuardedSignalHandle {
    /// Whether the signal has been fired.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.shared.is_signaled()
    }
}

impl SignalHandle for GuardedSignalHandle {
    #[cfg_attr(test, mutants::skip)] // Removing the notification only causes test timeouts.
    fn signal(&self) -> Result<()> {
        *self.shared.fired.lock() = true;

        // Notified after the lock is released, so the woken waiter does not immediately
        // block again on a lock we still hold.
        let woke_waiter = self.shared.condvar.notify_one();

        trace!(woke_waiter, "guarded flag set");

        Ok(())
    }
}

/// Consumer endpoint of [`GuardedFlagWait`].
#[derive(Debug)]
pub struct GuardedWaitHandle {
    shared: Arc<Shared>,
}

impl GuardedWaitHandle {
    /// Whether the signal has been fired.
    ///
    /// This takes the same lock as the wait itself.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.shared.is_signaled()
    }
}

impl WaitHandle for GuardedWaitHandle {
    fn wait_armed(&self, timeout: Option<Duration>, on_armed: &mut dyn FnMut()) -> Result<()> {
        let mut fired = self.shared.fired.lock();
        on_armed();

        match timeout {
            None => {
                self.shared.condvar.wait_while(&mut fired, |fired| !*fired);
                Ok(())
            }
            Some(timeout) => {
                self.shared
                    .condvar
                    .wait_while_for(&mut fired, |fired| !*fired, timeout);

                // The bound may elapse at the same moment the flag is set. The flag decides.
                if *fired {
                    Ok(())
                } else {
                    Err(Error::TimedOut { timeout })
                }
            }
        }
    }
}

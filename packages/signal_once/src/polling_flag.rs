//! Signaling through a shared atomic flag that the waiter polls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::backoff::Backoff;
use crate::{Error, Result, SignalHandle, Strategy, WaitHandle};

/// Delivers the signal by storing `true` into a shared [`AtomicBool`], which the waiter polls.
///
/// The signal is never missed, whatever the order of the two calls: the waiter keeps polling
/// until the store becomes visible, and the release/acquire pair makes everything the
/// producer did before signaling visible to the waiter after it returns.
///
/// The cost is that the waiter never blocks. It stays runnable for the whole wait, spinning
/// briefly and then yielding its time slice between polls. This is a poor fit when the wait
/// may be long or the waiting thread should give up the processor.
///
/// Repeated signals are not detected; storing `true` again changes nothing.
///
/// # Example
///
/// ```rust
/// use signal_once::{PollingFlag, SignalHandle, Strategy, WaitHandle};
///
/// let (signal, wait) = PollingFlag::create();
///
/// signal.signal().unwrap();
///
/// // The flag stays set, so a late waiter still sees it.
/// wait.wait().unwrap();
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub struct PollingFlag;

impl Strategy for PollingFlag {
    const NAME: &'static str = "polling-flag";

    type Signal = PollingSignalHandle;
    type Wait = PollingWaitHandle;

    fn create() -> (Self::Signal, Self::Wait) {
        // The flag is the only shared state. Adding anything next to it would need a lock.
        let flag = Arc::new(AtomicBool::new(false));

        (
            PollingSignalHandle {
                flag: Arc::clone(&flag),
            },
            PollingWaitHandle { flag },
        )
    }
}

/// Producer endpoint of [`PollingFlag`].
#[derive(Debug)]
pub struct PollingSignalHandle {
    flag: Arc<AtomicBool>,
}

impl SignalHandle for PollingSignalHandle {
    #[cfg_attr(test, mutants::skip)] // Removing the store only causes test timeouts.
    fn signal(&self) -> Result<()> {
        self.flag.store(true, Ordering::Release);

        trace!("polling flag set");

        Ok(())
    }
}

/// Consumer endpoint of [`PollingFlag`].
#[derive(Debug)]
pub struct PollingWaitHandle {
    flag: Arc<AtomicBool>,
}

impl WaitHandle for PollingWaitHandle {
    fn wait_armed(&self, timeout: Option<Duration>, on_armed: &mut dyn FnMut()) -> Result<()> {
        // There is no state to arm - any store from now on is seen by the next load.
        on_armed();

        // A bound too large to represent is as good as no bound.
        let bound = timeout
            .and_then(|timeout| Some((Instant::now().checked_add(timeout)?, timeout)));
        let mut backoff = Backoff::new();

        loop {
            if self.flag.load(Ordering::Acquire) {
                return Ok(());
            }

            if let Some((deadline, timeout)) = bound {
                if Instant::now() >= deadline {
                    return Err(Error::TimedOut { timeout });
                }
            }

            backoff.snooze();
        }
    }
}

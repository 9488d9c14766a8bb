//! Signaling through a single-use completion cell.

use std::collections::HashMap;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use crate::{Error, Result, SignalHandle, Strategy, WaitHandle};

/// Delivers the signal by completing a shared cell exactly once.
///
/// Unlike the other strategies, the cell itself enforces the one-shot contract:
///
/// * A second [`signal()`][SignalHandle::signal] returns [`Error::AlreadySignaled`] and
///   leaves the cell untouched.
/// * Dropping the signal handle without signaling abandons the cell, and every wait returns
///   [`Error::ProducerAbandoned`] instead of blocking forever.
/// * Once resolved, the cell stays resolved. Repeated waits return the same result at once.
///
/// The wait handle can be cloned and every clone observes the completion, including clones
/// that are waiting at the same moment. The cell is heap-allocated and shared by all
/// endpoints; it is freed when the last endpoint is dropped.
///
/// # Example
///
/// ```rust
/// use signal_once::{Error, OneShotChannel, SignalHandle, Strategy, WaitHandle};
///
/// let (signal, wait) = OneShotChannel::create();
///
/// signal.signal().unwrap();
/// assert!(matches!(signal.signal(), Err(Error::AlreadySignaled)));
///
/// wait.wait().unwrap();
/// wait.wait().unwrap();
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub struct OneShotChannel;

impl Strategy for OneShotChannel {
    const NAME: &'static str = "one-shot-channel";

    type Signal = ChannelSignalHandle;
    type Wait = ChannelWaitHandle;

    fn create() -> (Self::Signal, Self::Wait) {
        let shared = Arc::new(Shared::default());

        (
            ChannelSignalHandle {
                shared: Arc::clone(&shared),
            },
            ChannelWaitHandle { shared },
        )
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum CellStatus {
    /// Nothing has happened yet. The only state that may be left.
    #[default]
    Pending,

    /// The producer signaled.
    Completed,

    /// The producer was dropped without signaling.
    Abandoned,
}

#[derive(Debug, Default)]
struct CellState {
    status: CellStatus,

    // Async waiters to wake when the cell leaves the pending state, keyed by the slot that the
    // owning future remembers. A future removes its own entry when dropped.
    wakers: HashMap<u64, Waker>,
    next_waker_slot: u64,
}

impl CellState {
    /// Stores the waker of a pending future, reusing the future's slot if it already has one.
    fn register_waker(&mut self, slot: &mut Option<u64>, waker: &Waker) {
        match slot.and_then(|slot| self.wakers.get_mut(&slot)) {
            Some(registered) => {
                if !registered.will_wake(waker) {
                    registered.clone_from(waker);
                }
            }
            None => {
                let new_slot = self.next_waker_slot;
                self.next_waker_slot = self.next_waker_slot.wrapping_add(1);

                self.wakers.insert(new_slot, waker.clone());
                *slot = Some(new_slot);
            }
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<CellState>,

    // Blocking waiters, woken with `notify_all` so every clone of the wait handle is released.
    condvar: Condvar,
}

impl Shared {
    /// Moves the cell out of the pending state and wakes everyone waiting for that.
    ///
    /// Fails if the cell has already been resolved, in which case nothing changes.
    #[cfg_attr(test, mutants::skip)] // Skipping the wakeups only causes test timeouts.
    fn resolve(&self, status: CellStatus) -> Result<()> {
        let wakers = {
            let mut state = self.state.lock();

            if state.status != CellStatus::Pending {
                return Err(Error::AlreadySignaled);
            }

            state.status = status;
            mem::take(&mut state.wakers)
        };

        let woke_blocked = self.condvar.notify_all();
        let woke_async = wakers.len();

        for waker in wakers.into_values() {
            waker.wake();
        }

        trace!(?status, woke_blocked, woke_async, "completion cell resolved");

        Ok(())
    }

    fn status(&self) -> CellStatus {
        self.state.lock().status
    }

    #[cfg(test)]
    fn registered_wakers(&self) -> usize {
        self.state.lock().wakers.len()
    }
}

impl CellStatus {
    /// The outcome of a wait that found the cell in this state, or `None` if still pending.
    fn outcome(self) -> Option<Result<()>> {
        match self {
            Self::Pending => None,
            Self::Completed => Some(Ok(())),
            Self::Abandoned => Some(Err(Error::ProducerAbandoned)),
        }
    }
}

/// Producer endpoint of [`OneShotChannel`].
///
/// Dropping this without calling [`signal()`][SignalHandle::signal] abandons the cell.
#[derive(Debug)]
pub struct ChannelSignalHandle {
    shared: Arc<Shared>,
}

impl ChannelSignalHandle {
    /// Whether the signal has been fired.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.shared.status() == CellStatus::Completed
    }
}

impl SignalHandle for ChannelSignalHandle {
    fn signal(&self) -> Result<()> {
        self.shared.resolve(CellStatus::Completed)
    }
}

impl Drop for ChannelSignalHandle {
    fn drop(&mut self) {
        // Fails if we already signaled, which is the expected case and needs no action.
        if self.shared.resolve(CellStatus::Abandoned).is_ok() {
            warn!("producer dropped without signaling - waiters are released with an error");
        }
    }
}

/// Consumer endpoint of [`OneShotChannel`].
///
/// Clones share the same cell and all of them observe the completion.
#[derive(Clone, Debug)]
pub struct ChannelWaitHandle {
    shared: Arc<Shared>,
}

impl ChannelWaitHandle {
    /// Whether the signal has been fired.
    ///
    /// An abandoned cell is not signaled.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.shared.status() == CellStatus::Completed
    }

    /// Returns a future that resolves once the signal is fired or the producer is abandoned.
    ///
    /// The future has the same outcome as [`wait()`][WaitHandle::wait] but does not block
    /// the thread that polls it.
    ///
    /// # Example
    ///
    /// ```rust
    /// use futures::executor::block_on;
    /// use signal_once::{OneShotChannel, SignalHandle, Strategy};
    ///
    /// let (signal, wait) = OneShotChannel::create();
    ///
    /// signal.signal().unwrap();
    /// block_on(wait.wait_async()).unwrap();
    /// ```
    #[must_use]
    pub fn wait_async(&self) -> ChannelWaitFuture {
        ChannelWaitFuture {
            shared: Arc::clone(&self.shared),
            waker_slot: None,
        }
    }
}

impl WaitHandle for ChannelWaitHandle {
    fn wait_armed(&self, timeout: Option<Duration>, on_armed: &mut dyn FnMut()) -> Result<()> {
        let mut state = self.shared.state.lock();
        on_armed();

        let is_pending = |state: &mut CellState| state.status == CellStatus::Pending;

        match timeout {
            None => {
                self.shared.condvar.wait_while(&mut state, is_pending);
            }
            Some(timeout) => {
                self.shared
                    .condvar
                    .wait_while_for(&mut state, is_pending, timeout);
            }
        }

        match (state.status.outcome(), timeout) {
            (Some(outcome), _) => outcome,
            (None, Some(timeout)) => Err(Error::TimedOut { timeout }),
            (None, None) => unreachable!("unbounded wait returned while the cell was pending"),
        }
    }
}

/// Future returned by [`ChannelWaitHandle::wait_async()`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct ChannelWaitFuture {
    shared: Arc<Shared>,

    // Where our waker lives in the cell state, once we have been polled while pending.
    waker_slot: Option<u64>,
}

impl Future for ChannelWaitFuture {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.shared.state.lock();

        if let Some(outcome) = state.status.outcome() {
            // Resolving the cell already took every registered waker.
            this.waker_slot = None;
            return Poll::Ready(outcome);
        }

        // Only the most recent waker of this future needs to be woken.
        state.register_waker(&mut this.waker_slot, cx.waker());

        Poll::Pending
    }
}

impl Drop for ChannelWaitFuture {
    fn drop(&mut self) {
        if let Some(slot) = self.waker_slot.take() {
            self.shared.state.lock().wakers.remove(&slot);
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::task::Wake;
    use std::thread;

    use futures::executor::block_on;
    use static_assertions::assert_impl_all;
    use testing::with_watchdog;

    use super::*;

    assert_impl_all!(ChannelSignalHandle: Send, Sync);
    assert_impl_all!(ChannelWaitHandle: Send, Sync, Clone);
    assert_impl_all!(ChannelWaitFuture: Send, Unpin);

    #[test]
    fn second_signal_is_rejected() {
        with_watchdog(|| {
            let (signal, wait) = OneShotChannel::create();

            signal.signal().unwrap();
            assert!(matches!(signal.signal(), Err(Error::AlreadySignaled)));

            // Still exactly one completion from the consumer's point of view.
            assert!(wait.is_signaled());
            wait.wait().unwrap();
        });
    }

    #[test]
    fn wait_after_completion_is_idempotent() {
        with_watchdog(|| {
            let (signal, wait) = OneShotChannel::create();
            signal.signal().unwrap();

            let first = wait.wait_timeout(Duration::from_millis(1));
            let second = wait.wait_timeout(Duration::from_millis(1));

            assert!(first.is_ok());
            assert!(second.is_ok());
        });
    }

    #[test]
    fn dropped_producer_releases_waiter() {
        with_watchdog(|| {
            let (signal, wait) = OneShotChannel::create();

            let waiter = thread::spawn(move || wait.wait());

            thread::sleep(Duration::from_millis(5));
            drop(signal);

            let result = waiter.join().unwrap();
            assert!(matches!(result, Err(Error::ProducerAbandoned)));
        });
    }

    #[test]
    fn dropped_producer_after_signal_is_not_abandonment() {
        let (signal, wait) = OneShotChannel::create();

        signal.signal().unwrap();
        drop(signal);

        wait.wait().unwrap();
        assert!(wait.is_signaled());
    }

    #[test]
    fn abandoned_cell_is_not_signaled() {
        let (signal, wait) = OneShotChannel::create();
        drop(signal);

        assert!(!wait.is_signaled());
        assert!(matches!(wait.wait(), Err(Error::ProducerAbandoned)));
        assert!(matches!(wait.wait(), Err(Error::ProducerAbandoned)));
    }

    #[test]
    fn all_concurrent_waiters_are_released() {
        with_watchdog(|| {
            let (signal, wait) = OneShotChannel::create();
            let ready = Arc::new(Barrier::new(3));

            let waiters = (0..2)
                .map(|_| {
                    let wait = wait.clone();
                    let ready = Arc::clone(&ready);

                    thread::spawn(move || {
                        ready.wait();
                        wait.wait()
                    })
                })
                .collect::<Vec<_>>();

            ready.wait();
            signal.signal().unwrap();

            for waiter in waiters {
                waiter.join().unwrap().unwrap();
            }
        });
    }

    #[test]
    fn wait_times_out_while_pending() {
        with_watchdog(|| {
            let (_signal, wait) = OneShotChannel::create();

            let result = wait.wait_timeout(Duration::from_millis(10));
            assert!(matches!(result, Err(Error::TimedOut { .. })));
        });
    }

    #[test]
    fn async_wait_completes_after_signal_from_other_thread() {
        with_watchdog(|| {
            let (signal, wait) = OneShotChannel::create();

            let signaler = thread::spawn(move || {
                thread::sleep(Duration::from_millis(5));
                signal.signal().unwrap();
            });

            block_on(wait.wait_async()).unwrap();
            signaler.join().unwrap();
        });
    }

    #[test]
    fn async_wait_reports_abandonment() {
        with_watchdog(|| {
            let (signal, wait) = OneShotChannel::create();
            let future = wait.wait_async();

            drop(signal);

            assert!(matches!(block_on(future), Err(Error::ProducerAbandoned)));
        });
    }

    #[test]
    fn shared_state_outlives_wait_handle() {
        let (signal, wait) = OneShotChannel::create();
        let future = wait.wait_async();
        drop(wait);

        signal.signal().unwrap();
        block_on(future).unwrap();
    }

    #[derive(Debug, Default)]
    struct FlagWaker {
        woken: AtomicBool,
    }

    impl Wake for FlagWaker {
        fn wake(self: Arc<Self>) {
            self.woken.store(true, Ordering::Relaxed);
        }
    }

    fn poll_once(future: &mut ChannelWaitFuture, waker: &Waker) -> Poll<Result<()>> {
        Pin::new(future).poll(&mut Context::from_waker(waker))
    }

    #[test]
    fn dropped_pending_futures_release_their_wakers() {
        let (_signal, wait) = OneShotChannel::create();

        for _ in 0..1000 {
            let waker = Waker::from(Arc::new(FlagWaker::default()));
            let mut future = wait.wait_async();

            assert!(poll_once(&mut future, &waker).is_pending());
            assert_eq!(wait.shared.registered_wakers(), 1);
        }

        assert_eq!(wait.shared.registered_wakers(), 0);
    }

    #[test]
    fn repolled_future_keeps_one_waker() {
        let (signal, wait) = OneShotChannel::create();
        let mut future = wait.wait_async();

        let first = Arc::new(FlagWaker::default());
        let second = Arc::new(FlagWaker::default());

        assert!(poll_once(&mut future, &Waker::from(Arc::clone(&first))).is_pending());
        assert!(poll_once(&mut future, &Waker::from(Arc::clone(&second))).is_pending());
        assert_eq!(wait.shared.registered_wakers(), 1);

        signal.signal().unwrap();

        // Only the latest waker is notified.
        assert!(!first.woken.load(Ordering::Relaxed));
        assert!(second.woken.load(Ordering::Relaxed));

        let waker = Waker::from(second);
        assert!(matches!(poll_once(&mut future, &waker), Poll::Ready(Ok(()))));
    }

    #[test]
    fn dropping_one_future_does_not_forget_another() {
        let (signal, wait) = OneShotChannel::create();

        let kept_flag = Arc::new(FlagWaker::default());
        let kept_waker = Waker::from(Arc::clone(&kept_flag));
        let mut kept = wait.wait_async();
        let mut dropped = wait.wait_async();

        assert!(poll_once(&mut kept, &kept_waker).is_pending());
        assert!(
            poll_once(&mut dropped, &Waker::from(Arc::new(FlagWaker::default()))).is_pending()
        );
        drop(dropped);

        assert_eq!(wait.shared.registered_wakers(), 1);

        signal.signal().unwrap();

        assert!(kept_flag.woken.load(Ordering::Relaxed));
        assert_eq!(wait.shared.registered_wakers(), 0);
        assert!(matches!(poll_once(&mut kept, &kept_waker), Poll::Ready(Ok(()))));
    }
}

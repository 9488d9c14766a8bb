//! The contract shared by every signaling strategy.
//!
//! A strategy hands out a connected pair of endpoints: a [`SignalHandle`] for the producer and a
//! [`WaitHandle`] for the consumer. The wait resolves after the signal, never before. Whether it
//! is guaranteed to resolve at all depends on the strategy - see the strategy types for details.

use std::time::Duration;

use crate::Result;

/// The producer side of a one-shot signal.
pub trait SignalHandle: Send {
    /// Fires the signal.
    ///
    /// This never blocks beyond a brief, uncontended lock acquisition.
    ///
    /// # Errors
    ///
    /// Strategies that enforce exactly-once completion return [`Error::AlreadySignaled`]
    /// on a repeated call. The others treat a repeated call as a no-op and return `Ok`.
    ///
    /// [`Error::AlreadySignaled`]: crate::Error::AlreadySignaled
    fn signal(&self) -> Result<()>;
}

/// The consumer side of a one-shot signal.
pub trait WaitHandle: Send {
    /// Waits for the signal, calling `on_armed` once the wait is committed to observing any
    /// signal that starts after `on_armed` returns.
    ///
    /// For the lock-based strategies, `on_armed` runs while the lock is held, immediately
    /// before the wait blocks. It must not call back into the same endpoints.
    ///
    /// If `timeout` is `None`, the wait is unbounded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimedOut`] if `timeout` elapses before the signal is observed, or
    /// [`Error::ProducerAbandoned`] if the strategy detects that the signal can never arrive.
    ///
    /// [`Error::TimedOut`]: crate::Error::TimedOut
    /// [`Error::ProducerAbandoned`]: crate::Error::ProducerAbandoned
    fn wait_armed(&self, timeout: Option<Duration>, on_armed: &mut dyn FnMut()) -> Result<()>;

    /// Waits for the signal without a time limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProducerAbandoned`] if the strategy detects that the signal can
    /// never arrive.
    ///
    /// [`Error::ProducerAbandoned`]: crate::Error::ProducerAbandoned
    fn wait(&self) -> Result<()> {
        self.wait_armed(None, &mut || {})
    }

    /// Waits for the signal for at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimedOut`] if the signal is not observed in time, or
    /// [`Error::ProducerAbandoned`] if the strategy detects that the signal can never arrive.
    ///
    /// [`Error::TimedOut`]: crate::Error::TimedOut
    /// [`Error::ProducerAbandoned`]: crate::Error::ProducerAbandoned
    fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        self.wait_armed(Some(timeout), &mut || {})
    }
}

/// A mechanism for delivering a one-shot signal from one thread to another.
pub trait Strategy {
    /// Human-readable name, used in reports and logs.
    const NAME: &'static str;

    /// The producer endpoint.
    type Signal: SignalHandle;

    /// The consumer endpoint.
    type Wait: WaitHandle;

    /// Creates a fresh, unfired signal and returns its connected endpoints.
    ///
    /// The shared state lives as long as the longer-lived of the two endpoints.
    fn create() -> (Self::Signal, Self::Wait);
}

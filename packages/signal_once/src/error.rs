use std::time::Duration;

use thiserror::Error;

use crate::Actor;

/// Errors that can occur when signaling, waiting or running a harness scenario.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The producer completed a single-use signal that had already been completed.
    ///
    /// Only strategies that enforce exactly-once completion report this. The signal
    /// state is left untouched, so waiters still observe exactly one completion.
    #[error("the signal has already been completed")]
    AlreadySignaled,

    /// The producer handle was dropped without ever signaling, so the wait can never succeed.
    #[error("the producer was dropped without signaling")]
    ProducerAbandoned,

    /// A bounded wait elapsed before the signal was observed.
    #[error("no signal was observed within {timeout:?}")]
    TimedOut {
        /// The bound that the caller placed on the wait.
        timeout: Duration,
    },

    /// One of the actors in a harness scenario panicked.
    #[error("the {actor} actor panicked: {message}")]
    ActorPanicked {
        /// Which actor panicked.
        actor: Actor,

        /// The panic message, if the payload was a string.
        message: String,
    },
}

/// A specialized `Result` type for signaling operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

//! Drives the signaling strategies through an identical two-thread scenario.
//!
//! A scenario has two actors. The signaler performs its critical action ("check"), then fires
//! the signal. The waiter waits for the signal, then performs its critical action ("react").
//! Each critical action takes a [`Stamp`] from a counter owned by the harness, so the report
//! can tell whether the reaction really happened after the check.
//!
//! The counter is only incremented with relaxed atomics, so it never orders the actors by
//! itself - any ordering it reveals was established by the strategy under test (or by the
//! synchronization point of a forced [`Schedule`]).

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::{
    Error, GuardedFlagWait, OneShotChannel, PollingFlag, PredicateWait, Result, SignalHandle,
    Strategy, StrategyKind, WaitHandle,
};

const DEFAULT_SIGNAL_DELAY: Duration = Duration::from_millis(1);
const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// One of the two threads in a scenario.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Actor {
    /// Performs the "check" action and fires the signal.
    Signaler,

    /// Waits for the signal and performs the "react" action.
    Waiter,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signaler => f.write_str("signaler"),
            Self::Waiter => f.write_str("waiter"),
        }
    }
}

/// Controls how the start of the wait is ordered relative to the signal.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum Schedule {
    /// The waiter starts waiting immediately and the signaler fires after the configured
    /// delay. Nothing else orders the two.
    #[default]
    Unordered,

    /// The waiter does not start waiting until the signal has been fired.
    ///
    /// This is the adversarial schedule for [`PredicateWait`].
    SignalFirst,

    /// The signal is not fired until the waiter is armed, i.e. committed to observing any
    /// signal that starts afterwards.
    WaitFirst,
}

impl Schedule {
    /// Every schedule.
    pub const ALL: [Self; 3] = [Self::Unordered, Self::SignalFirst, Self::WaitFirst];

    /// The name of the schedule, as accepted by [`FromStr`].
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Unordered => "unordered",
            Self::SignalFirst => "signal-first",
            Self::WaitFirst => "wait-first",
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Schedule {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('_', "-");

        Self::ALL
            .into_iter()
            .find(|schedule| schedule.name() == normalized)
            .ok_or_else(|| {
                format!(
                    "Invalid schedule: '{s}'. Valid options are: unordered, signal-first, wait-first"
                )
            })
    }
}

/// Parameters of a scenario.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use signal_once::{ScenarioConfig, Schedule};
///
/// let config = ScenarioConfig::new()
///     .with_schedule(Schedule::SignalFirst)
///     .with_wait_timeout(Duration::from_millis(50));
///
/// assert_eq!(config.schedule(), Schedule::SignalFirst);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct ScenarioConfig {
    schedule: Schedule,
    signal_delay: Duration,
    wait_timeout: Duration,
}

impl ScenarioConfig {
    /// Creates a configuration with the default unordered schedule, a 1 ms signal delay and
    /// a 5 second wait timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            schedule: Schedule::default(),
            signal_delay: DEFAULT_SIGNAL_DELAY,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    /// Sets the schedule.
    #[must_use]
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Sets how long the signaler sleeps before its critical action.
    #[must_use]
    pub fn with_signal_delay(mut self, signal_delay: Duration) -> Self {
        self.signal_delay = signal_delay;
        self
    }

    /// Sets the bound on every wait. Waits are never unbounded in a scenario.
    #[must_use]
    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// The schedule.
    #[must_use]
    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// How long the signaler sleeps before its critical action.
    #[must_use]
    pub fn signal_delay(&self) -> Duration {
        self.signal_delay
    }

    /// The bound on every wait.
    #[must_use]
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// When a critical action happened: its position in the scenario and the time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Stamp {
    sequence: u64,
    at: Instant,
}

impl Stamp {
    /// Position of the action among all actions stamped in the scenario, starting from zero.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// When the action happened.
    #[must_use]
    pub fn at(&self) -> Instant {
        self.at
    }
}

/// A critical action of one of the actors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Milestone {
    /// The signaler's action, right before it signals.
    Check,

    /// The waiter's action, right after its wait returned.
    React,
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Check => f.write_str("check!"),
            Self::React => f.write_str("react!"),
        }
    }
}

#[derive(Debug, Default)]
struct Timeline {
    next_sequence: AtomicU64,
}

impl Timeline {
    fn stamp(&self) -> Stamp {
        Stamp {
            // Relaxed is enough: the modification order of a single atomic is total, so an
            // action ordered after another by the strategy always gets a higher number.
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            at: Instant::now(),
        }
    }
}

/// A synchronization point between the actors, used by the forced schedules.
///
/// If the actor holding the other end fails, passing the gate does not block.
#[derive(Debug)]
enum Gate {
    Unused,
    Opens(mpsc::Sender<()>),
    Blocks(mpsc::Receiver<()>),
}

impl Gate {
    fn pair(schedule: Schedule) -> (Self, Self) {
        let (tx, rx) = mpsc::channel();

        match schedule {
            Schedule::Unordered => (Self::Unused, Self::Unused),
            Schedule::SignalFirst => (Self::Opens(tx), Self::Blocks(rx)),
            Schedule::WaitFirst => (Self::Blocks(rx), Self::Opens(tx)),
        }
    }

    fn open(&self) {
        if let Self::Opens(tx) = self {
            if tx.send(()).is_err() {
                // The other actor already failed. Its error is reported when it is joined.
                trace!("gate opened with nobody waiting to pass it");
            }
        }
    }

    fn pass(&self) {
        if let Self::Blocks(rx) = self {
            if rx.recv().is_err() {
                // The other actor failed before opening the gate. Its error is reported when
                // it is joined, so we just carry on.
                trace!("gate passed without being opened");
            }
        }
    }
}

/// The outcome of one scenario.
#[derive(Debug)]
pub struct ScenarioReport {
    strategy: &'static str,
    schedule: Schedule,
    checked: Stamp,
    reaction: Result<Stamp>,
}

impl ScenarioReport {
    /// Name of the strategy under test.
    #[must_use]
    pub fn strategy(&self) -> &'static str {
        self.strategy
    }

    /// The schedule the scenario ran with.
    #[must_use]
    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// When the signaler performed its critical action.
    #[must_use]
    pub fn checked(&self) -> Stamp {
        self.checked
    }

    /// When the waiter performed its critical action, or why its wait failed.
    ///
    /// # Errors
    ///
    /// Returns the error the wait failed with, typically [`Error::TimedOut`].
    pub fn reaction(&self) -> std::result::Result<Stamp, &Error> {
        self.reaction.as_ref().copied()
    }

    /// Whether the waiter reacted, and did so after the signaler's critical action.
    #[must_use]
    pub fn reacted_after_check(&self) -> bool {
        self.reaction
            .as_ref()
            .is_ok_and(|reacted| reacted.sequence > self.checked.sequence)
    }

    /// Whether the waiter gave up because its wait timed out.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        matches!(self.reaction, Err(Error::TimedOut { .. }))
    }

    /// Time from the check to the reaction, if the waiter reacted.
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.reaction
            .as_ref()
            .ok()
            .map(|reacted| reacted.at.saturating_duration_since(self.checked.at))
    }

    /// The milestones that happened, in the order they happened.
    #[must_use]
    pub fn milestones(&self) -> Vec<(Milestone, Stamp)> {
        let mut milestones = vec![(Milestone::Check, self.checked)];

        if let Ok(reacted) = self.reaction {
            milestones.push((Milestone::React, reacted));
        }

        milestones.sort_by_key(|(_, stamp)| stamp.sequence);
        milestones
    }
}

/// Aggregate of many runs of the same scenario.
#[derive(Clone, Copy, Debug)]
pub struct StressSummary {
    strategy: &'static str,
    iterations: u32,
    ordered: u32,
    failures: u32,
    timed_out: u32,
    max_latency: Duration,
}

impl StressSummary {
    /// Name of the strategy under test.
    #[must_use]
    pub fn strategy(&self) -> &'static str {
        self.strategy
    }

    /// How many scenarios ran.
    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// How many scenarios reacted after the check.
    #[must_use]
    pub fn ordered(&self) -> u32 {
        self.ordered
    }

    /// How many scenarios ended with the wait failing for any reason, timeouts included.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// How many scenarios ended with the wait timing out.
    #[must_use]
    pub fn timed_out(&self) -> u32 {
        self.timed_out
    }

    /// The largest check-to-react latency observed.
    #[must_use]
    pub fn max_latency(&self) -> Duration {
        self.max_latency
    }

    /// Whether every scenario reacted after the check.
    #[must_use]
    pub fn all_ordered(&self) -> bool {
        self.ordered == self.iterations
    }
}

/// Runs scenarios for any strategy with one configuration.
///
/// # Example
///
/// ```rust
/// use signal_once::{GuardedFlagWait, Harness};
///
/// let harness = Harness::default();
/// let report = harness.run::<GuardedFlagWait>().unwrap();
///
/// assert!(report.reacted_after_check());
/// ```
#[derive(Debug, Default)]
pub struct Harness {
    config: ScenarioConfig,
}

impl Harness {
    /// Creates a harness that runs scenarios with the given configuration.
    #[must_use]
    pub fn new(config: ScenarioConfig) -> Self {
        Self { config }
    }

    /// The configuration used for every scenario.
    #[must_use]
    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Runs one scenario with a fresh instance of strategy `S`.
    ///
    /// A failed wait (e.g. a timeout) is an observation and is part of the report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActorPanicked`] if either actor panicked, or the error from
    /// [`SignalHandle::signal()`] if signaling failed.
    pub fn run<S: Strategy>(&self) -> Result<ScenarioReport> {
        let ScenarioConfig {
            schedule,
            signal_delay,
            wait_timeout,
        } = self.config;

        debug!(strategy = S::NAME, %schedule, "scenario starting");

        let (signal, wait) = S::create();
        let (signaler_gate, waiter_gate) = Gate::pair(schedule);
        let timeline = Timeline::default();

        let (checked, reaction) = thread::scope(|scope| {
            let timeline = &timeline;

            let signaler = thread::Builder::new()
                .name(format!("{}-{}", S::NAME, Actor::Signaler))
                .spawn_scoped(scope, move || -> Result<Stamp> {
                    signaler_gate.pass();
                    thread::sleep(signal_delay);

                    let checked = timeline.stamp();
                    signal.signal()?;
                    signaler_gate.open();

                    Ok(checked)
                })
                .expect("failed to spawn signaler thread: thread spawning failure is not supported");

            let waiter = thread::Builder::new()
                .name(format!("{}-{}", S::NAME, Actor::Waiter))
                .spawn_scoped(scope, move || -> Result<Stamp> {
                    waiter_gate.pass();
                    wait.wait_armed(Some(wait_timeout), &mut || waiter_gate.open())?;

                    Ok(timeline.stamp())
                })
                .expect("failed to spawn waiter thread: thread spawning failure is not supported");

            // Both are joined before either result is inspected, so no actor outlives the call.
            let checked = join_actor(Actor::Signaler, signaler);
            let reaction = join_actor(Actor::Waiter, waiter);

            (checked, reaction)
        });

        let reaction = match reaction {
            Err(error @ Error::ActorPanicked { .. }) => return Err(error),
            other => other,
        };

        let report = ScenarioReport {
            strategy: S::NAME,
            schedule,
            checked: checked?,
            reaction,
        };

        debug!(
            strategy = S::NAME,
            %schedule,
            reacted_after_check = report.reacted_after_check(),
            latency = ?report.latency(),
            "scenario finished"
        );

        Ok(report)
    }

    /// Runs one scenario with a fresh instance of the given strategy.
    ///
    /// # Errors
    ///
    /// See [`run()`][Self::run].
    pub fn run_kind(&self, kind: StrategyKind) -> Result<ScenarioReport> {
        match kind {
            StrategyKind::PredicateWait => self.run::<PredicateWait>(),
            StrategyKind::PollingFlag => self.run::<PollingFlag>(),
            StrategyKind::GuardedFlagWait => self.run::<GuardedFlagWait>(),
            StrategyKind::OneShotChannel => self.run::<OneShotChannel>(),
        }
    }

    /// Runs one scenario per strategy, one after the other.
    ///
    /// # Errors
    ///
    /// Stops at the first scenario that fails. See [`run()`][Self::run].
    pub fn run_all(&self) -> Result<Vec<ScenarioReport>> {
        StrategyKind::ALL
            .into_iter()
            .map(|kind| self.run_kind(kind))
            .collect()
    }

    /// Runs `iterations` scenarios with strategy `S` and summarizes them.
    ///
    /// # Errors
    ///
    /// Stops at the first scenario that fails. See [`run()`][Self::run].
    pub fn stress<S: Strategy>(&self, iterations: u32) -> Result<StressSummary> {
        let mut summary = StressSummary {
            strategy: S::NAME,
            iterations,
            ordered: 0,
            failures: 0,
            timed_out: 0,
            max_latency: Duration::ZERO,
        };

        for _ in 0..iterations {
            let report = self.run::<S>()?;

            if report.reacted_after_check() {
                summary.ordered = summary.ordered.saturating_add(1);
            }

            if report.reaction.is_err() {
                summary.failures = summary.failures.saturating_add(1);
            }

            if report.timed_out() {
                summary.timed_out = summary.timed_out.saturating_add(1);
            }

            if let Some(latency) = report.latency() {
                summary.max_latency = summary.max_latency.max(latency);
            }
        }

        debug!(
            strategy = S::NAME,
            iterations,
            ordered = summary.ordered,
            failures = summary.failures,
            timed_out = summary.timed_out,
            "stress run finished"
        );

        Ok(summary)
    }

    /// Runs `iterations` scenarios with the given strategy and summarizes them.
    ///
    /// # Errors
    ///
    /// See [`stress()`][Self::stress].
    pub fn stress_kind(&self, kind: StrategyKind, iterations: u32) -> Result<StressSummary> {
        match kind {
            StrategyKind::PredicateWait => self.stress::<PredicateWait>(iterations),
            StrategyKind::PollingFlag => self.stress::<PollingFlag>(iterations),
            StrategyKind::GuardedFlagWait => self.stress::<GuardedFlagWait>(iterations),
            StrategyKind::OneShotChannel => self.stress::<OneShotChannel>(iterations),
        }
    }
}

fn join_actor(actor: Actor, handle: ScopedJoinHandle<'_, Result<Stamp>>) -> Result<Stamp> {
    handle.join().unwrap_or_else(|payload| {
        let message = format_panic_payload(&payload);
        warn!(%actor, panic_message = %message, "scenario actor panicked");

        Err(Error::ActorPanicked { actor, message })
    })
}

/// Formats a panic payload for logging.
fn format_panic_payload(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

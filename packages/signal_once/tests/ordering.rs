//! Ordering and liveness of every strategy, exercised through the harness with real threads.
//!
//! These tests are ignored under Miri because they spawn thousands of threads.

use std::time::{Duration, Instant};

use signal_once::{
    GuardedFlagWait, Harness, OneShotChannel, PollingFlag, PredicateWait, ScenarioConfig,
    Schedule, Strategy, StrategyKind,
};
use testing::{with_watchdog, with_watchdog_timeout};

const REPETITIONS: u32 = 1000;

// Short enough to keep a thousand repetitions fast, long enough that the waiter is usually
// blocked by the time the signal arrives.
const SIGNAL_DELAY: Duration = Duration::from_micros(100);

fn assert_always_ordered<S: Strategy + 'static>() {
    with_watchdog_timeout(Duration::from_secs(120), || {
        let harness = Harness::new(ScenarioConfig::new().with_signal_delay(SIGNAL_DELAY));
        let summary = harness.stress::<S>(REPETITIONS).unwrap();

        assert_eq!(summary.iterations(), REPETITIONS);
        assert_eq!(summary.failures(), 0, "{}", S::NAME);
        assert!(summary.all_ordered(), "{}", S::NAME);
    });
}

#[cfg_attr(miri, ignore)]
#[test]
fn guarded_flag_wait_always_reacts_after_check() {
    assert_always_ordered::<GuardedFlagWait>();
}

#[cfg_attr(miri, ignore)]
#[test]
fn polling_flag_always_reacts_after_check() {
    assert_always_ordered::<PollingFlag>();
}

#[cfg_attr(miri, ignore)]
#[test]
fn one_shot_channel_always_reacts_after_check() {
    assert_always_ordered::<OneShotChannel>();
}

#[cfg_attr(miri, ignore)]
#[test]
fn strategies_that_remember_signal_survive_every_schedule() {
    with_watchdog(|| {
        for schedule in Schedule::ALL {
            let harness = Harness::new(
                ScenarioConfig::new()
                    .with_schedule(schedule)
                    .with_wait_timeout(Duration::from_secs(2)),
            );

            for kind in StrategyKind::ALL
                .into_iter()
                .filter(|kind| kind.remembers_signal())
            {
                let report = harness.run_kind(kind).unwrap();

                assert!(report.reacted_after_check(), "{kind} with {schedule}");
                assert!(report.latency().is_some(), "{kind} with {schedule}");
            }
        }
    });
}

#[cfg_attr(miri, ignore)]
#[test]
fn predicate_wait_hangs_when_signal_comes_first() {
    with_watchdog(|| {
        let harness = Harness::new(
            ScenarioConfig::new()
                .with_schedule(Schedule::SignalFirst)
                .with_wait_timeout(Duration::from_millis(50)),
        );

        let started = Instant::now();
        let report = harness.run::<PredicateWait>().unwrap();

        assert!(report.timed_out());
        assert!(started.elapsed() >= Duration::from_millis(50));
    });
}

#[cfg_attr(miri, ignore)]
#[test]
fn predicate_wait_reacts_when_wait_comes_first() {
    with_watchdog(|| {
        let harness = Harness::new(
            ScenarioConfig::new()
                .with_schedule(Schedule::WaitFirst)
                .with_wait_timeout(Duration::from_secs(2)),
        );

        for _ in 0..100 {
            let report = harness.run::<PredicateWait>().unwrap();

            assert!(report.reacted_after_check());
            assert!(report.latency().unwrap() < Duration::from_secs(2));
        }
    });
}

#[cfg_attr(miri, ignore)]
#[test]
fn predicate_wait_outcome_depends_on_schedule() {
    with_watchdog(|| {
        let config = ScenarioConfig::new().with_wait_timeout(Duration::from_millis(50));

        let favorable = Harness::new(config.with_schedule(Schedule::WaitFirst))
            .run::<PredicateWait>()
            .unwrap();
        let adversarial = Harness::new(config.with_schedule(Schedule::SignalFirst))
            .run::<PredicateWait>()
            .unwrap();

        assert!(favorable.reacted_after_check());
        assert!(adversarial.timed_out());
    });
}

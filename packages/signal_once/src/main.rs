#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))]

//! Binary entry point for the signal_once demonstration.
//!
//! Runs the two-actor scenario for one or all strategies and prints the order in which the
//! "check" and "react" actions happened.

use std::io;
use std::num::NonZero;
use std::process::ExitCode;
use std::time::Duration;

use argh::FromArgs;
use signal_once::{Harness, ScenarioConfig, ScenarioReport, Schedule, StrategyKind};
use tracing_subscriber::EnvFilter;

/// Deliver a one-shot signal between two threads using different strategies and print the
/// order in which the signal and the reaction happened.
#[derive(FromArgs)]
struct Args {
    /// strategy to run (predicate-wait, polling-flag, guarded-flag-wait, one-shot-channel);
    /// all strategies are run if omitted
    #[argh(option)]
    strategy: Option<StrategyKind>,

    /// how to order the wait relative to the signal (unordered, signal-first, wait-first)
    #[argh(option, default = "Schedule::Unordered")]
    schedule: Schedule,

    /// milliseconds the signaler sleeps before signaling
    #[argh(option, default = "1")]
    signal_delay_ms: u64,

    /// milliseconds after which a wait gives up
    #[argh(option, default = "5000")]
    timeout_ms: u64,

    /// run each scenario this many times (at least 1) and print a summary instead of the event
    /// order when more than once
    #[argh(option, default = "NonZero::<u32>::MIN")]
    repetitions: NonZero<u32>,
}

// Binary entry point - mutations would require subprocess testing which is impractical.
#[cfg_attr(test, mutants::skip)]
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Args = argh::from_env();

    let harness = Harness::new(
        ScenarioConfig::new()
            .with_schedule(args.schedule)
            .with_signal_delay(Duration::from_millis(args.signal_delay_ms))
            .with_wait_timeout(Duration::from_millis(args.timeout_ms)),
    );

    let kinds = args
        .strategy
        .map_or_else(|| StrategyKind::ALL.to_vec(), |kind| vec![kind]);

    let repetitions = args.repetitions.get();

    for kind in kinds {
        let outcome = if repetitions > 1 {
            harness
                .stress_kind(kind, repetitions)
                .map(|summary| {
                    println!(
                        "{kind}: {ordered}/{iterations} reacted after check, {failures} waits failed ({timed_out} timed out), max latency {max_latency:?}",
                        ordered = summary.ordered(),
                        iterations = summary.iterations(),
                        failures = summary.failures(),
                        timed_out = summary.timed_out(),
                        max_latency = summary.max_latency(),
                    );
                })
        } else {
            harness.run_kind(kind).map(|report| print_report(kind, &report))
        };

        if let Err(e) = outcome {
            eprintln!("Error: {kind}: {e}");
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

fn print_report(kind: StrategyKind, report: &ScenarioReport) {
    println!(">>>> {kind} ({})", report.schedule());

    for (milestone, _) in report.milestones() {
        println!("{milestone}");
    }

    match (report.reaction(), report.latency()) {
        (Ok(_), Some(latency)) => println!("reacted {latency:?} after check"),
        (Err(e), _) => println!("no reaction: {e}"),
        (Ok(_), None) => {}
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn repetitions_default_to_one() {
        let Ok(args) = Args::from_args(&["signal_once"], &[]) else {
            panic!("no arguments at all should parse");
        };

        assert_eq!(args.repetitions.get(), 1);
    }

    #[test]
    fn zero_repetitions_are_rejected() {
        let Err(early_exit) = Args::from_args(&["signal_once"], &["--repetitions", "0"]) else {
            panic!("zero repetitions should not parse");
        };

        assert_eq!(early_exit.status, Err(()));
        assert!(early_exit.output.contains("--repetitions"));
    }

    #[test]
    fn options_are_parsed() {
        let Ok(args) = Args::from_args(
            &["signal_once"],
            &[
                "--strategy",
                "polling-flag",
                "--schedule",
                "wait-first",
                "--repetitions",
                "3",
            ],
        ) else {
            panic!("valid options should parse");
        };

        assert_eq!(args.strategy, Some(StrategyKind::PollingFlag));
        assert_eq!(args.schedule, Schedule::WaitFirst);
        assert_eq!(args.repetitions.get(), 3);
        assert_eq!(args.timeout_ms, 5000);
    }
}

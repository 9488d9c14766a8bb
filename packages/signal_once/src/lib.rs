#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Four ways to deliver a one-shot "event happened" signal from one thread to another, and a
//! harness that compares them under one contract.
//!
//! Every strategy hands out a connected [`SignalHandle`] and [`WaitHandle`] pair from
//! [`Strategy::create()`]. The wait resolves after the signal, never before. The strategies
//! differ in whether the wait is guaranteed to resolve, in what waiting costs and in how
//! misuse is reported:
//!
//! | Strategy            | Early signal | Waiter while waiting | Repeat signal               |
//! |---------------------|--------------|----------------------|-----------------------------|
//! | [`PredicateWait`]   | lost         | blocked              | ignored                     |
//! | [`PollingFlag`]     | observed     | spinning / yielding  | ignored                     |
//! | [`GuardedFlagWait`] | observed     | blocked              | ignored                     |
//! | [`OneShotChannel`]  | observed     | blocked or async     | [`Error::AlreadySignaled`]  |
//!
//! [`PredicateWait`] deliberately reproduces the lost-wakeup hazard and must only ever be
//! waited on with a timeout.
//!
//! # Example
//!
//! ```rust
//! use std::thread;
//!
//! use signal_once::{GuardedFlagWait, SignalHandle, Strategy, WaitHandle};
//!
//! let (signal, wait) = GuardedFlagWait::create();
//!
//! let waiter = thread::spawn(move || {
//!     wait.wait().unwrap();
//!     println!("react!");
//! });
//!
//! println!("check!");
//! signal.signal().unwrap();
//!
//! waiter.join().unwrap();
//! ```
//!
//! # Comparing strategies
//!
//! ```rust
//! use signal_once::{Harness, ScenarioConfig, Schedule};
//!
//! let harness = Harness::new(ScenarioConfig::new().with_schedule(Schedule::WaitFirst));
//!
//! for report in harness.run_all().unwrap() {
//!     assert!(report.reacted_after_check(), "{}", report.strategy());
//! }
//! ```

mod backoff;
mod error;
mod guarded_flag_wait;
mod handles;
mod harness;
mod one_shot_channel;
mod polling_flag;
mod predicate_wait;
mod strategy_kind;

pub use error::*;
pub use guarded_flag_wait::*;
pub use handles::*;
pub use harness::*;
pub use one_shot_channel::*;
pub use polling_flag::*;
pub use predicate_wait::*;
pub use strategy_kind::*;

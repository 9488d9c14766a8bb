use std::fmt;
use std::str::FromStr;

use crate::{GuardedFlagWait, OneShotChannel, PollingFlag, PredicateWait, Strategy};

/// Identifies one of the signaling strategies at runtime, e.g. when selected by name on the
/// command line.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum StrategyKind {
    /// [`PredicateWait`].
    PredicateWait,

    /// [`PollingFlag`].
    PollingFlag,

    /// [`GuardedFlagWait`].
    GuardedFlagWait,

    /// [`OneShotChannel`].
    OneShotChannel,
}

impl StrategyKind {
    /// Every strategy, in the order they are usually compared.
    pub const ALL: [Self; 4] = [
        Self::PredicateWait,
        Self::PollingFlag,
        Self::GuardedFlagWait,
        Self::OneShotChannel,
    ];

    /// The name of the strategy, as accepted by [`FromStr`].
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::PredicateWait => PredicateWait::NAME,
            Self::PollingFlag => PollingFlag::NAME,
            Self::GuardedFlagWait => GuardedFlagWait::NAME,
            Self::OneShotChannel => OneShotChannel::NAME,
        }
    }

    /// Whether a wait is guaranteed to observe a signal that was sent before the wait started.
    ///
    /// Only [`PredicateWait`] lacks this guarantee.
    #[must_use]
    pub fn remembers_signal(self) -> bool {
        !matches!(self, Self::PredicateWait)
    }
}

impl fmt::Display for StrategyKind {
    #[cfg_attr(test, mutants::skip)] // No API contract for display output beyond the name.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('_', "-");

        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
            .ok_or_else(|| {
                let valid = Self::ALL.map(Self::name).join(", ");
                format!("Invalid strategy: '{s}'. Valid options are: {valid}")
            })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn parses_every_name() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.name().parse::<StrategyKind>().unwrap(), kind);
        }
    }

    #[test]
    fn parsing_is_lenient_about_case_and_separator() {
        assert_eq!(
            "Guarded_Flag_Wait".parse::<StrategyKind>().unwrap(),
            StrategyKind::GuardedFlagWait
        );
        assert_eq!(
            "ONE-SHOT-CHANNEL".parse::<StrategyKind>().unwrap(),
            StrategyKind::OneShotChannel
        );
    }

    #[test]
    fn unknown_name_lists_valid_options() {
        let error = "semaphore".parse::<StrategyKind>().unwrap_err();

        assert!(error.contains("semaphore"));
        assert!(error.contains("polling-flag"));
    }

    #[test]
    fn display_matches_name() {
        assert_eq!(StrategyKind::PollingFlag.to_string(), "polling-flag");
    }

    #[test]
    fn only_predicate_wait_forgets_early_signals() {
        let forgetful = StrategyKind::ALL
            .into_iter()
            .filter(|kind| !kind.remembers_signal())
            .collect::<Vec<_>>();

        assert_eq!(forgetful, vec![StrategyKind::PredicateWait]);
    }
}

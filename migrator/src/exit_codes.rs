//! Stable exit codes for migrator CLI commands.

use crate::orchestrator::{RunOutcome, Termination};

/// The candidate passed (or the command succeeded).
pub const OK: i32 = 0;
/// Invalid arguments or config, or any error before a run could start.
pub const INVALID: i32 = 1;
/// The run finished with a result that does not pass.
pub const NOT_PASSED: i32 = 2;
/// The run ended without any attempt result.
pub const NO_RESULT: i32 = 3;

pub fn for_outcome(outcome: &RunOutcome) -> i32 {
    match (&outcome.termination, &outcome.result) {
        (Termination::Passed, _) => OK,
        (Termination::Fatal { .. }, _) | (_, None) => NO_RESULT,
        (_, Some(_)) => NOT_PASSED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{ExhaustedReason, FatalReason};
    use crate::test_support::failing_result;
    use std::path::PathBuf;

    fn outcome(termination: Termination, with_result: bool) -> RunOutcome {
        RunOutcome {
            termination,
            result: with_result.then(|| failing_result(1, 2)),
            attempts: 1,
            agent_calls: 1,
            output_path: PathBuf::from("a.migrated.test.tsx"),
        }
    }

    #[test]
    fn maps_terminations_to_codes() {
        assert_eq!(for_outcome(&outcome(Termination::Passed, true)), OK);
        assert_eq!(for_outcome(&outcome(Termination::Stagnated, true)), NOT_PASSED);
        let exhausted = Termination::Exhausted {
            reason: ExhaustedReason::AgentTurns,
        };
        assert_eq!(for_outcome(&outcome(exhausted, false)), NO_RESULT);
        let fatal = Termination::Fatal {
            reason: FatalReason::AgentCall("boom".to_string()),
        };
        assert_eq!(for_outcome(&outcome(fatal, false)), NO_RESULT);
    }
}

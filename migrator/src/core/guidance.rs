//! Operator text fed back to the agent between turns.

use crate::core::capability::CapabilityKind;
use crate::core::types::AttemptResult;

/// Failed submissions after which unused capabilities are advertised.
pub const NUDGE_AFTER_FAILED_ATTEMPTS: u32 = 2;

/// Bytes of runner output echoed back to the agent per attempt.
const RUNNER_LOG_TAIL_BYTES: usize = 6_000;

pub const PROTOCOL_CORRECTION: &str = "You replied without calling a tool. Do not answer in \
prose. Use read_file or find_reference_examples if you need more context, then call \
submit_candidate with the complete migrated test file.";

pub const SOURCE_EDITS_DISABLED: &str =
    "propose_source_edit is disabled for this run. Change only the test file.";

pub fn budget_exhausted(kind: CapabilityKind, limit: u32) -> String {
    format!(
        "{kind} may be called at most {limit} time(s) per run and its budget is used up. \
         Continue with the information you already have."
    )
}

pub fn file_not_found(reference: &str) -> String {
    format!("no file found for `{reference}`. Do not request this path again.")
}

/// Tool-result text for a validated submission.
pub fn submission_report(attempt: u32, result: &AttemptResult) -> String {
    let mut buf = format!(
        "Attempt {attempt}: {} passed, {} failed, {} skipped, {} total ({}% passing).",
        result.passed, result.failed, result.skipped, result.total, result.success_rate
    );
    match result.type_check_passed {
        Some(true) => buf.push_str(" Type check passed."),
        Some(false) => buf.push_str(" Type check reported errors."),
        None => {}
    }
    buf.push_str("\n\nRunner output:\n");
    buf.push_str(log_tail(&result.runner_log, RUNNER_LOG_TAIL_BYTES));
    buf
}

/// Operator guidance after a rejected submission.
pub fn attempt_feedback(
    failed_attempts: u32,
    remaining: u32,
    result: &AttemptResult,
    unused: &[CapabilityKind],
) -> String {
    let mut buf = if result.did_pass {
        "The tests pass but the type check reported errors. Fix the type errors.".to_string()
    } else {
        format!(
            "The migrated test is not passing yet ({} of {} tests pass). Read the runner \
             output, fix the failures, and submit the complete file again.",
            result.passed, result.total
        )
    };
    buf.push_str(&format!(" You have {remaining} attempt(s) remaining."));

    if failed_attempts >= NUDGE_AFTER_FAILED_ATTEMPTS && !unused.is_empty() {
        let names: Vec<&str> = unused.iter().map(|kind| kind.as_str()).collect();
        buf.push_str(&format!(
            "\n\nYou have not used {} yet. Use them to inspect the component or add a missing \
             hook before another blind submission.",
            names.join(", ")
        ));
    }
    buf
}

fn log_tail(log: &str, max_bytes: usize) -> &str {
    if log.len() <= max_bytes {
        return log;
    }
    let mut start = log.len() - max_bytes;
    while !log.is_char_boundary(start) {
        start += 1;
    }
    &log[start..]
}

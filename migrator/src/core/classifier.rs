//! Deterministic classification of test runner and type-checker output.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{AttemptResult, TestCounts};

static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("ansi pattern should be valid")
});

static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Tests:\s*(?:(\d+) failed, )?(?:(\d+) skipped, )?(?:(\d+) passed, )?(\d+) total",
    )
    .expect("summary pattern should be valid")
});

/// Remove terminal color and cursor escape sequences.
pub fn strip_ansi(raw: &str) -> String {
    ANSI_RE.replace_all(raw, "").into_owned()
}

/// Extract counts from the `Tests:` summary line. No match yields zeros.
pub fn parse_test_counts(clean: &str) -> TestCounts {
    let Some(caps) = SUMMARY_RE.captures(clean) else {
        return TestCounts::default();
    };
    let count = |idx: usize| {
        caps.get(idx)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(0)
    };
    TestCounts {
        failed: count(1),
        skipped: count(2),
        passed: count(3),
        total: count(4),
    }
}

/// Reduce raw (merged stdout/stderr) runner output to an [`AttemptResult`].
///
/// A run passes only when the log never mentions `FAIL`, at least one test
/// passed, none failed, and passed plus skipped accounts for every test.
pub fn classify_test_output(raw: &str) -> AttemptResult {
    let clean = strip_ansi(raw);
    let counts = parse_test_counts(&clean);
    let did_pass = !clean.contains("FAIL")
        && counts.passed > 0
        && counts.failed == 0
        && counts.passed + counts.skipped == counts.total;
    AttemptResult::from_counts(counts, did_pass, clean)
}

/// A type-check passes when its output never mentions `error`.
pub fn classify_type_check(raw: &str) -> bool {
    !strip_ansi(raw).contains("error")
}

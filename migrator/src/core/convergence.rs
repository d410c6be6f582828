//! Stop/continue decisions over the history of submitted attempts.

use serde::{Deserialize, Serialize};

use crate::core::types::AttemptResult;

/// Success rates of completed submissions, oldest first. Append-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessRateHistory {
    rates: Vec<u32>,
}

impl SuccessRateHistory {
    pub fn push(&mut self, rate: u32) {
        self.rates.push(rate);
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn rates(&self) -> &[u32] {
        &self.rates
    }

    /// True when the last `window` rates exist and are all identical.
    pub fn is_flat(&self, window: usize) -> bool {
        if window == 0 || self.rates.len() < window {
            return false;
        }
        let tail = &self.rates[self.rates.len() - window..];
        tail.windows(2).all(|pair| pair[0] == pair[1])
    }
}

/// Decision after one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The latest attempt is accepted.
    Success,
    /// Rates stopped moving; the latest attempt is the best we will get.
    Stagnated,
    /// Keep going with `remaining` submissions left (may be zero).
    Continue { remaining: u32 },
}

/// Tunable convergence parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergencePolicy {
    pub max_attempts: u32,
    /// Number of trailing identical rates that counts as stagnation.
    pub stagnation_window: u32,
    /// Stagnation is not considered before this many submissions.
    pub stagnation_min_attempts: u32,
    /// A failed type-check vetoes an otherwise passing run.
    pub type_check_gates_success: bool,
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            stagnation_window: 3,
            stagnation_min_attempts: 3,
            type_check_gates_success: true,
        }
    }
}

impl ConvergencePolicy {
    pub fn is_success(&self, result: &AttemptResult) -> bool {
        if !result.did_pass {
            return false;
        }
        !(self.type_check_gates_success && result.type_check_passed == Some(false))
    }

    /// Evaluate after `latest` has been appended to `history`.
    pub fn evaluate(&self, history: &SuccessRateHistory, latest: &AttemptResult) -> Verdict {
        if self.is_success(latest) {
            return Verdict::Success;
        }
        let attempts = history.len() as u32;
        if attempts >= self.stagnation_min_attempts
            && history.is_flat(self.stagnation_window as usize)
        {
            return Verdict::Stagnated;
        }
        Verdict::Continue {
            remaining: self.max_attempts.saturating_sub(attempts),
        }
    }
}

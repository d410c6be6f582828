//! In-memory bookkeeping threaded through one orchestration run.
//!
//! All counters are mutated only through the transition methods below so the
//! orchestrator's state machine stays explicit and serializable.

use serde::Serialize;

use crate::core::budget::BudgetTracker;
use crate::core::convergence::SuccessRateHistory;
use crate::core::types::AttemptResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunState {
    pub budget: BudgetTracker,
    pub history: SuccessRateHistory,
    /// Completed submissions.
    pub attempts: u32,
    /// Submissions the convergence policy did not accept.
    pub failed_attempts: u32,
    /// Agent calls issued, including ones answered with a protocol correction.
    pub agent_calls: u32,
    /// Agent turns that contained no capability invocation.
    pub protocol_corrections: u32,
    /// Most recent attempt result, if any submission completed.
    pub latest: Option<AttemptResult>,
}

impl RunState {
    pub fn new(budget: BudgetTracker) -> Self {
        Self {
            budget,
            history: SuccessRateHistory::default(),
            attempts: 0,
            failed_attempts: 0,
            agent_calls: 0,
            protocol_corrections: 0,
            latest: None,
        }
    }

    pub fn record_agent_call(&mut self) {
        self.agent_calls += 1;
    }

    pub fn record_protocol_violation(&mut self) {
        self.protocol_corrections += 1;
    }

    /// Fold a completed submission into the history. Returns the attempt number.
    pub fn record_attempt(&mut self, result: AttemptResult) -> u32 {
        self.history.push(result.success_rate);
        self.attempts += 1;
        self.latest = Some(result);
        self.attempts
    }

    pub fn record_rejection(&mut self) {
        self.failed_attempts += 1;
    }
}

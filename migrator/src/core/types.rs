//! Shared deterministic types for the migration core.
//!
//! These types define stable contracts between the orchestrator, the handlers,
//! and the agent client. They do not depend on external state or I/O.

use serde::{Deserialize, Serialize};

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Standing instructions for the whole run.
    System,
    /// Task context, corrective instructions, and attempt feedback.
    Operator,
    /// A reply produced by the LLM agent.
    Agent,
    /// The answer to one capability invocation.
    Capability,
}

/// A capability call requested by the agent.
///
/// `arguments` is the raw JSON string exactly as the agent produced it; it is
/// decoded per capability by [`crate::core::capability::decode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityInvocation {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Body of a capability result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultBody {
    /// The capability ran and produced output.
    Output { text: String },
    /// The capability was refused or could not complete.
    Refusal { reason: String },
}

/// Answer to exactly one [`CapabilityInvocation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityResult {
    pub invocation_id: String,
    pub body: ResultBody,
}

impl CapabilityResult {
    pub fn output(invocation_id: &str, text: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.to_string(),
            body: ResultBody::Output { text: text.into() },
        }
    }

    pub fn refusal(invocation_id: &str, reason: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.to_string(),
            body: ResultBody::Refusal {
                reason: reason.into(),
            },
        }
    }

    pub fn is_refusal(&self) -> bool {
        matches!(self.body, ResultBody::Refusal { .. })
    }

    /// Text sent back to the agent for this result.
    pub fn render(&self) -> String {
        match &self.body {
            ResultBody::Output { text } => text.clone(),
            ResultBody::Refusal { reason } => format!("Error: {reason}"),
        }
    }
}

/// One conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    /// Capability calls made in an agent message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<CapabilityInvocation>,
    /// Set on capability messages: the invocation being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            invocations: Vec::new(),
            invocation_id: None,
        }
    }

    pub fn operator(content: impl Into<String>) -> Self {
        Self {
            role: Role::Operator,
            content: Some(content.into()),
            invocations: Vec::new(),
            invocation_id: None,
        }
    }

    pub fn agent(content: Option<String>, invocations: Vec<CapabilityInvocation>) -> Self {
        Self {
            role: Role::Agent,
            content,
            invocations,
            invocation_id: None,
        }
    }

    pub fn capability_result(result: &CapabilityResult) -> Self {
        Self {
            role: Role::Capability,
            content: Some(result.render()),
            invocations: Vec::new(),
            invocation_id: Some(result.invocation_id.clone()),
        }
    }
}

/// Append-only message history for a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Counts extracted from a test runner summary line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCounts {
    pub failed: u32,
    pub skipped: u32,
    pub passed: u32,
    pub total: u32,
}

impl TestCounts {
    /// Percentage of passing tests, rounded to the nearest integer.
    pub fn success_rate(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((f64::from(self.passed) / f64::from(self.total)) * 100.0).round() as u32
    }
}

/// Outcome of validating one submitted candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptResult {
    pub did_pass: bool,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub total: u32,
    /// 0 to 100.
    pub success_rate: u32,
    /// `None` when no type-checker is configured.
    pub type_check_passed: Option<bool>,
    pub runner_log: String,
}

impl AttemptResult {
    /// Build a result from parsed counts and a pass decision.
    pub fn from_counts(counts: TestCounts, did_pass: bool, runner_log: String) -> Self {
        Self {
            did_pass,
            passed: counts.passed,
            failed: counts.failed,
            skipped: counts.skipped,
            total: counts.total,
            success_rate: counts.success_rate(),
            type_check_passed: None,
            runner_log,
        }
    }

    /// A failing result with zero counts, used when the runner itself broke.
    pub fn runner_failure(runner_log: impl Into<String>) -> Self {
        Self::from_counts(TestCounts::default(), false, runner_log.into())
    }

    pub fn with_type_check(mut self, passed: bool) -> Self {
        self.type_check_passed = Some(passed);
        self
    }
}

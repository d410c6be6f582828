//! Test-only doubles and builders for driving migration runs without a model
//! or a JavaScript toolchain.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::core::types::{AttemptResult, CapabilityInvocation, TestCounts};
use crate::io::agent::{AgentClient, AgentReply, AgentRequest};
use crate::io::validation::{ValidationRequest, ValidationRunner};

/// Build an invocation whose arguments are `arguments` serialized as JSON.
pub fn invocation(id: &str, name: &str, arguments: Value) -> CapabilityInvocation {
    CapabilityInvocation {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}

/// An agent reply that calls the given capabilities.
pub fn calls(invocations: Vec<CapabilityInvocation>) -> AgentReply {
    AgentReply {
        finish_reason: Some("tool_calls".to_string()),
        text: None,
        invocations,
    }
}

/// An agent reply with prose only.
pub fn prose(text: &str) -> AgentReply {
    AgentReply {
        finish_reason: Some("stop".to_string()),
        text: Some(text.to_string()),
        invocations: Vec::new(),
    }
}

/// A reply that submits `file`.
pub fn submit(id: &str, file: &str) -> AgentReply {
    calls(vec![invocation(
        id,
        "submit_candidate",
        serde_json::json!({ "file": file }),
    )])
}

pub fn passing_result(total: u32) -> AttemptResult {
    AttemptResult::from_counts(
        TestCounts {
            failed: 0,
            skipped: 0,
            passed: total,
            total,
        },
        true,
        format!("PASS\nTests:       {total} passed, {total} total"),
    )
}

pub fn failing_result(passed: u32, total: u32) -> AttemptResult {
    let failed = total - passed;
    AttemptResult::from_counts(
        TestCounts {
            failed,
            skipped: 0,
            passed,
            total,
        },
        false,
        format!("FAIL\nTests:       {failed} failed, {passed} passed, {total} total"),
    )
}

/// Agent that replays queued replies and records what it was offered.
pub struct ScriptedAgent {
    replies: RefCell<VecDeque<Result<AgentReply>>>,
    calls: Cell<u32>,
    offered: RefCell<Vec<Vec<String>>>,
    transcript_lengths: RefCell<Vec<usize>>,
}

impl ScriptedAgent {
    pub fn new(replies: Vec<AgentReply>) -> Self {
        Self::with_results(replies.into_iter().map(Ok).collect())
    }

    pub fn with_results(replies: Vec<Result<AgentReply>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            calls: Cell::new(0),
            offered: RefCell::new(Vec::new()),
            transcript_lengths: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }

    /// Capability names offered on each call, in call order.
    pub fn offered(&self) -> Vec<Vec<String>> {
        self.offered.borrow().clone()
    }

    /// Conversation length seen on each call.
    pub fn transcript_lengths(&self) -> Vec<usize> {
        self.transcript_lengths.borrow().clone()
    }
}

impl AgentClient for ScriptedAgent {
    fn complete(&self, request: &AgentRequest<'_>) -> Result<AgentReply> {
        self.calls.set(self.calls.get() + 1);
        self.offered.borrow_mut().push(
            request
                .capabilities
                .iter()
                .map(|schema| schema.name.to_string())
                .collect(),
        );
        self.transcript_lengths
            .borrow_mut()
            .push(request.messages.len());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("scripted agent has no replies left")))
    }
}

/// Validation runner that replays queued results.
pub struct ScriptedValidationRunner {
    results: RefCell<VecDeque<AttemptResult>>,
    calls: Cell<u32>,
    candidates: RefCell<Vec<String>>,
}

impl ScriptedValidationRunner {
    pub fn new(results: Vec<AttemptResult>) -> Self {
        Self {
            results: RefCell::new(results.into()),
            calls: Cell::new(0),
            candidates: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }

    /// Candidate file contents as they were on disk when validated.
    pub fn candidates(&self) -> Vec<String> {
        self.candidates.borrow().clone()
    }
}

impl ValidationRunner for ScriptedValidationRunner {
    fn validate(&self, request: &ValidationRequest) -> Result<AttemptResult> {
        self.calls.set(self.calls.get() + 1);
        let content = std::fs::read_to_string(&request.candidate_path).unwrap_or_default();
        self.candidates.borrow_mut().push(content);
        self.results
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted validator has no results left"))
    }
}

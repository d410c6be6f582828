//! Attempt orchestration for a single source test.
//!
//! One run owns its conversation and [`RunState`]. Each loop iteration asks
//! the agent for a turn, dispatches every invocation in order, and lets the
//! convergence policy decide after each submission whether to stop.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::core::capability::{CapabilityKind, CapabilitySchema};
use crate::core::convergence::{ConvergencePolicy, Verdict};
use crate::core::guidance;
use crate::core::path::normalize;
use crate::core::run_state::RunState;
use crate::core::types::{AttemptResult, Conversation, Message};
use crate::handlers::{Dispatch, RunContext, dispatch};
use crate::io::agent::{AgentClient, AgentRequest};
use crate::io::attempt_log::AttemptLog;
use crate::io::config::MigratorConfig;
use crate::io::imports::{absolutize_imports, relativize_imports};
use crate::io::locator::ContentLocator;
use crate::io::prompt::{PromptBuilder, PromptInputs};
use crate::io::references::ReferenceFinder;
use crate::io::validation::ValidationRunner;

/// What to migrate and where.
#[derive(Debug, Clone)]
pub struct MigrationRequest {
    pub source_path: PathBuf,
    /// Defaults to the source path with `.<infix>` before the first extension.
    pub output_path: Option<PathBuf>,
    /// Project root; relative paths resolve here and the runner starts here.
    pub workdir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedReason {
    /// The submission ceiling was reached.
    Attempts,
    /// The agent-call ceiling was reached.
    AgentTurns,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FatalReason {
    /// `submit_candidate` arguments could not be decoded.
    MalformedSubmission(String),
    /// The agent call itself failed.
    AgentCall(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Termination {
    Passed,
    Stagnated,
    Exhausted { reason: ExhaustedReason },
    Fatal { reason: FatalReason },
}

/// Final value of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub termination: Termination,
    /// Latest attempt result; always `None` after a fatal termination.
    pub result: Option<AttemptResult>,
    pub attempts: u32,
    pub agent_calls: u32,
    pub output_path: PathBuf,
}

impl RunOutcome {
    pub fn passed(&self) -> bool {
        self.termination == Termination::Passed
    }
}

/// Insert `.<infix>` before the first extension of the file name:
/// `Button.test.tsx` becomes `Button.migrated.test.tsx`.
pub fn candidate_path(source: &Path, infix: &str) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let split = name
        .char_indices()
        .skip(1)
        .find(|(_, c)| *c == '.')
        .map(|(idx, _)| idx);
    let renamed = match split {
        Some(idx) => format!("{}.{infix}{}", &name[..idx], &name[idx..]),
        None => format!("{name}.{infix}"),
    };
    source.with_file_name(renamed)
}

/// Replace the source test with the passing candidate.
///
/// Relative imports were written for the output location, so they are
/// re-anchored on the source path before the candidate takes its place.
pub fn promote_candidate(outcome: &RunOutcome, source_path: &Path) -> Result<()> {
    if !outcome.passed() {
        bail!("refusing to replace {}: run did not pass", source_path.display());
    }
    let output = &outcome.output_path;
    let candidate = fs::read_to_string(output)
        .with_context(|| format!("read candidate {}", output.display()))?;
    let promoted = relativize_imports(&absolutize_imports(&candidate, output), source_path);
    fs::write(source_path, promoted)
        .with_context(|| format!("write {}", source_path.display()))?;
    fs::remove_file(output).with_context(|| format!("remove {}", output.display()))?;
    info!(path = %source_path.display(), "replaced source test with candidate");
    Ok(())
}

/// Migrate one test file.
///
/// `Err` is returned only when the run cannot start (unreadable source,
/// missing instructions, template failure). Every terminal condition after
/// that is reported through [`RunOutcome::termination`].
#[instrument(skip_all, fields(source = %request.source_path.display()))]
pub fn run_migration<A: AgentClient, V: ValidationRunner>(
    config: &MigratorConfig,
    request: &MigrationRequest,
    agent: &A,
    validator: &V,
) -> Result<RunOutcome> {
    let workdir = normalize(&request.workdir);
    let source_path = absolute(&workdir, &request.source_path);
    let output_path = match &request.output_path {
        Some(path) => absolute(&workdir, path),
        None => candidate_path(&source_path, &config.output_infix),
    };
    if output_path == source_path {
        bail!("output path must differ from the source test {}", source_path.display());
    }

    let source = fs::read_to_string(&source_path)
        .with_context(|| format!("read source test {}", source_path.display()))?;
    let inputs = PromptInputs::from_config(
        config,
        &source_path,
        &output_path,
        absolutize_imports(&source, &source_path),
    )?;
    let prompt = PromptBuilder::new(config.prompt_budget_bytes).build(&inputs)?;

    let ctx = RunContext {
        source_path: source_path.clone(),
        output_path: output_path.clone(),
        workdir: workdir.clone(),
        allow_source_edits: config.allow_source_edits,
        locator: ContentLocator::new(config.locator.extensions.clone()),
        references: ReferenceFinder::from_config(&config.references, &config.discovery),
        attempt_log: config
            .attempt_log_dir
            .as_ref()
            .map(|dir| {
                AttemptLog::new(&absolute(&workdir, dir), &workdir, &source_path)
            }),
    };

    if let Some(log) = &ctx.attempt_log
        && let Err(err) = log.reset()
    {
        warn!(err = %format!("{err:#}"), "failed to clear previous attempt log");
    }

    let mut conversation = Conversation::new();
    conversation.push(Message::system(prompt.system));
    conversation.push(Message::operator(prompt.task));

    let mut state = RunState::new(config.budget_tracker());
    let policy = config.convergence_policy();
    info!(output = %output_path.display(), "starting migration");

    let termination = loop {
        if state.agent_calls >= config.max_agent_turns {
            warn!(agent_calls = state.agent_calls, "agent turn ceiling reached");
            break Termination::Exhausted {
                reason: ExhaustedReason::AgentTurns,
            };
        }

        let offered: Vec<CapabilitySchema> = state
            .budget
            .offered()
            .into_iter()
            .map(CapabilityKind::schema)
            .collect();
        state.record_agent_call();
        let reply = match agent.complete(&AgentRequest {
            messages: conversation.messages(),
            capabilities: &offered,
        }) {
            Ok(reply) => reply,
            Err(err) => {
                let detail = format!("{err:#}");
                error!(err = %detail, "agent call failed");
                break Termination::Fatal {
                    reason: FatalReason::AgentCall(detail),
                };
            }
        };

        let is_prose = reply.is_prose();
        conversation.push(Message::agent(reply.text, reply.invocations.clone()));
        if is_prose {
            state.record_protocol_violation();
            warn!(
                corrections = state.protocol_corrections,
                "agent replied without invoking a capability"
            );
            conversation.push(Message::operator(guidance::PROTOCOL_CORRECTION));
            continue;
        }

        let mut guidance_messages = Vec::new();
        let mut verdict = None;
        for invocation in &reply.invocations {
            match dispatch(&ctx, &mut state, validator, invocation) {
                Dispatch::Answered(result) => {
                    conversation.push(Message::capability_result(&result));
                }
                Dispatch::Fatal(detail) => {
                    verdict = Some(Termination::Fatal {
                        reason: FatalReason::MalformedSubmission(detail),
                    });
                    break;
                }
                Dispatch::Submitted {
                    reply,
                    attempt,
                    result,
                } => {
                    conversation.push(Message::capability_result(&reply));
                    match judge(&policy, &mut state, attempt, &result) {
                        Judgement::Stop(termination) => {
                            verdict = Some(termination);
                            break;
                        }
                        Judgement::Continue(feedback) => guidance_messages.push(feedback),
                    }
                }
            }
        }
        if let Some(termination) = verdict {
            break termination;
        }
        for feedback in guidance_messages {
            conversation.push(Message::operator(feedback));
        }
    };

    let result = match termination {
        Termination::Fatal { .. } => None,
        _ => state.latest.clone(),
    };
    info!(
        termination = ?termination,
        attempts = state.attempts,
        agent_calls = state.agent_calls,
        "migration finished"
    );

    if let Some(log) = &ctx.attempt_log
        && let Err(err) = log.write_summary(&conversation, &state)
    {
        warn!(err = %format!("{err:#}"), "failed to write run summary");
    }

    Ok(RunOutcome {
        termination,
        result,
        attempts: state.attempts,
        agent_calls: state.agent_calls,
        output_path,
    })
}

enum Judgement {
    Stop(Termination),
    Continue(String),
}

fn judge(
    policy: &ConvergencePolicy,
    state: &mut RunState,
    attempt: u32,
    latest: &AttemptResult,
) -> Judgement {
    match policy.evaluate(&state.history, latest) {
        Verdict::Success => {
            info!(attempt, "candidate passed");
            Judgement::Stop(Termination::Passed)
        }
        Verdict::Stagnated => {
            state.record_rejection();
            info!(attempt, rate = latest.success_rate, "success rate stagnated");
            Judgement::Stop(Termination::Stagnated)
        }
        Verdict::Continue { remaining: 0 } => {
            state.record_rejection();
            info!(attempt, "attempt ceiling reached");
            Judgement::Stop(Termination::Exhausted {
                reason: ExhaustedReason::Attempts,
            })
        }
        Verdict::Continue { remaining } => {
            state.record_rejection();
            let unused = state.budget.unused();
            let nudge = if unused.contains(&CapabilityKind::ProposeSourceEdit) {
                unused
            } else {
                Vec::new()
            };
            Judgement::Continue(guidance::attempt_feedback(
                state.failed_attempts,
                remaining,
                latest,
                &nudge,
            ))
        }
    }
}

fn absolute(workdir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&workdir.join(path))
    }
}

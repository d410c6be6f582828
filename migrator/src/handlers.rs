//! Capability handlers: one arm per capability, dispatched by exhaustive match.
//!
//! Every path through [`dispatch`] ends in a [`CapabilityResult`] for the
//! agent, except a submission whose arguments cannot be decoded, which is
//! surfaced as [`Dispatch::Fatal`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use crate::core::budget::BudgetCheck;
use crate::core::capability::{
    Capability, CapabilityKind, DecodeError, FileTarget, FindReferencesArgs, ProposeEditArgs,
    ReadFileArgs, SubmitArgs, decode,
};
use crate::core::guidance;
use crate::core::path::{normalize, to_absolute};
use crate::core::run_state::RunState;
use crate::core::types::{AttemptResult, CapabilityInvocation, CapabilityResult};
use crate::io::attempt_log::{AttemptLog, AttemptMeta};
use crate::io::imports::relativize_imports;
use crate::io::locator::ContentLocator;
use crate::io::references::ReferenceFinder;
use crate::io::validation::{ValidationRequest, ValidationRunner};

/// Line prepended to every file returned by `read_file`.
pub const ABSOLUTE_PATH_MARKER: &str = "// Absolute path:";

/// Immutable per-run collaborators and paths shared by all handlers.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Absolute path of the test being migrated.
    pub source_path: PathBuf,
    /// Absolute path every submission is written to.
    pub output_path: PathBuf,
    /// Directory the test runner starts in; relative arguments resolve here.
    pub workdir: PathBuf,
    pub allow_source_edits: bool,
    pub locator: ContentLocator,
    pub references: ReferenceFinder,
    pub attempt_log: Option<AttemptLog>,
}

impl RunContext {
    fn absolute(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.workdir.join(path))
        }
    }

    fn resolve_target(&self, target: &FileTarget) -> PathBuf {
        match target {
            FileTarget::Absolute(path) => self.absolute(path),
            FileTarget::Relative { reference, origin } => {
                let origin = origin
                    .as_deref()
                    .map_or_else(|| self.source_path.clone(), |o| self.absolute(o));
                to_absolute(reference, &origin)
            }
        }
    }
}

/// What happened to one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A non-submission capability produced its result.
    Answered(CapabilityResult),
    /// A candidate was validated and folded into the run state as `attempt`.
    Submitted {
        reply: CapabilityResult,
        attempt: u32,
        result: AttemptResult,
    },
    /// The submission could not be decoded; the run must stop.
    Fatal(String),
}

/// Route one invocation through budget checks to its handler.
#[instrument(skip_all, fields(capability = %invocation.name, id = %invocation.id))]
pub fn dispatch<V: ValidationRunner>(
    ctx: &RunContext,
    state: &mut RunState,
    validator: &V,
    invocation: &CapabilityInvocation,
) -> Dispatch {
    let id = invocation.id.as_str();
    let Some(kind) = CapabilityKind::from_name(&invocation.name) else {
        warn!("agent invoked an unknown capability");
        return Dispatch::Answered(CapabilityResult::refusal(
            id,
            DecodeError::UnknownCapability(invocation.name.clone()).to_string(),
        ));
    };

    if kind == CapabilityKind::ProposeSourceEdit && !ctx.allow_source_edits {
        return Dispatch::Answered(CapabilityResult::refusal(
            id,
            guidance::SOURCE_EDITS_DISABLED,
        ));
    }

    match state.budget.try_consume(kind) {
        BudgetCheck::Exhausted { limit } => {
            info!(limit, "capability budget exhausted");
            return Dispatch::Answered(CapabilityResult::refusal(
                id,
                guidance::budget_exhausted(kind, limit),
            ));
        }
        BudgetCheck::Granted { remaining } => debug!(remaining, "budget granted"),
        BudgetCheck::Unbounded => {}
    }

    let capability = match decode(invocation) {
        Ok(capability) => capability,
        Err(err) if kind == CapabilityKind::SubmitCandidate => {
            error!(err = %err, "malformed submission");
            return Dispatch::Fatal(err.to_string());
        }
        Err(err) => {
            warn!(err = %err, "malformed capability arguments");
            return Dispatch::Answered(CapabilityResult::refusal(id, err.to_string()));
        }
    };

    match capability {
        Capability::ReadFile(args) => Dispatch::Answered(read_file(ctx, id, &args)),
        Capability::FindReferences(args) => {
            Dispatch::Answered(find_reference_examples(ctx, id, &args))
        }
        Capability::ProposeEdit(args) => Dispatch::Answered(propose_source_edit(ctx, id, &args)),
        Capability::Submit(args) => submit_candidate(ctx, state, validator, id, &args),
    }
}

fn read_file(ctx: &RunContext, id: &str, args: &ReadFileArgs) -> CapabilityResult {
    let Some(target) = args.target() else {
        return CapabilityResult::refusal(id, "read_file needs `path` or `absolutePath`");
    };
    let path = ctx.resolve_target(&target);
    match ctx.locator.locate(&path) {
        Some(file) => {
            debug!(path = %file.path.display(), "read file");
            CapabilityResult::output(
                id,
                format!("{ABSOLUTE_PATH_MARKER} {}\n{}", file.path.display(), file.content),
            )
        }
        None => {
            info!(path = %path.display(), "requested file not found");
            CapabilityResult::refusal(id, guidance::file_not_found(&target_label(&target)))
        }
    }
}

fn find_reference_examples(
    ctx: &RunContext,
    id: &str,
    args: &FindReferencesArgs,
) -> CapabilityResult {
    let test_path = ctx.absolute(&args.current_test_path);
    let exclude = [ctx.source_path.clone(), ctx.output_path.clone()];
    let examples = ctx
        .references
        .find(&test_path, args.search_depth, &args.keywords, &exclude);
    let text = serde_json::to_string_pretty(&examples).unwrap_or_else(|err| {
        warn!(err = %err, "serialize reference examples");
        "[]".to_string()
    });
    CapabilityResult::output(id, text)
}

fn propose_source_edit(ctx: &RunContext, id: &str, args: &ProposeEditArgs) -> CapabilityResult {
    let Some(target) = args.target() else {
        return CapabilityResult::refusal(id, "propose_source_edit needs `path` or `absolutePath`");
    };
    if args.new_content.trim().is_empty() || args.explanation.trim().is_empty() {
        return CapabilityResult::refusal(
            id,
            "propose_source_edit needs non-empty `newContent` and `explanation`",
        );
    }

    let path = ctx.resolve_target(&target);
    let Some(resolved) = ctx.locator.resolve(&path) else {
        return edit_response(
            id,
            false,
            format!("no source file found for `{}`", target_label(&target)),
        );
    };
    match ctx.locator.overwrite(&resolved, &args.new_content) {
        Ok(()) => {
            info!(path = %resolved.display(), explanation = %args.explanation, "applied source edit");
            edit_response(id, true, format!("updated {}", resolved.display()))
        }
        Err(err) => {
            warn!(path = %resolved.display(), err = %err, "source edit failed");
            edit_response(id, false, format!("{err:#}"))
        }
    }
}

fn edit_response(id: &str, success: bool, message: String) -> CapabilityResult {
    CapabilityResult::output(
        id,
        json!({ "success": success, "message": message }).to_string(),
    )
}

fn submit_candidate<V: ValidationRunner>(
    ctx: &RunContext,
    state: &mut RunState,
    validator: &V,
    id: &str,
    args: &SubmitArgs,
) -> Dispatch {
    let candidate = relativize_imports(&args.file, &ctx.output_path);
    let result = match write_candidate(&ctx.output_path, &candidate) {
        Ok(()) => {
            let request = ValidationRequest {
                candidate_path: ctx.output_path.clone(),
                workdir: ctx.workdir.clone(),
            };
            validator.validate(&request).unwrap_or_else(|err| {
                warn!(err = %err, "validation runner failed");
                AttemptResult::runner_failure(format!("{err:#}"))
            })
        }
        Err(err) => {
            warn!(err = %err, "failed to write candidate");
            AttemptResult::runner_failure(format!("{err:#}"))
        }
    };

    let attempt = state.record_attempt(result.clone());
    info!(
        attempt,
        did_pass = result.did_pass,
        success_rate = result.success_rate,
        "candidate validated"
    );

    if let Some(log) = &ctx.attempt_log {
        let meta = AttemptMeta::new(attempt, &ctx.source_path, &ctx.output_path, &result);
        if let Err(err) = log.write_attempt(&meta, &candidate, &result) {
            warn!(err = %format!("{err:#}"), "failed to write attempt log");
        }
    }

    Dispatch::Submitted {
        reply: CapabilityResult::output(id, guidance::submission_report(attempt, &result)),
        attempt,
        result,
    }
}

fn write_candidate(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create candidate dir {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("write candidate {}", path.display()))
}

fn target_label(target: &FileTarget) -> String {
    match target {
        FileTarget::Absolute(path) => path.clone(),
        FileTarget::Relative { reference, .. } => reference.clone(),
    }
}

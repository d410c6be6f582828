//! Test-runner adapter that turns a candidate file into an [`AttemptResult`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::core::classifier::{classify_test_output, classify_type_check};
use crate::core::types::AttemptResult;
use crate::io::config::MigratorConfig;
use crate::io::process::{run_shell_command, shell_quote};

const FILE_PLACEHOLDER: &str = "{file}";

#[derive(Debug, Clone)]
pub struct ValidationRequest {
    /// Candidate test file to execute.
    pub candidate_path: PathBuf,
    /// Directory the runner is started in, usually the project root.
    pub workdir: PathBuf,
}

pub trait ValidationRunner {
    /// Execute the candidate and classify the outcome. Runner failures are
    /// reported inside the returned result; `Err` is reserved for problems
    /// the orchestrator cannot describe to the agent.
    fn validate(&self, request: &ValidationRequest) -> Result<AttemptResult>;
}

#[derive(Debug, Clone)]
struct ShellStep {
    command: String,
    timeout: Duration,
}

/// Runs the configured test command, then the optional type check.
#[derive(Debug, Clone)]
pub struct CommandValidationRunner {
    test: ShellStep,
    type_check: Option<ShellStep>,
    output_limit_bytes: usize,
}

impl CommandValidationRunner {
    pub fn from_config(config: &MigratorConfig) -> Self {
        Self {
            test: ShellStep {
                command: config.test_runner.command.clone(),
                timeout: Duration::from_secs(config.test_runner.timeout_secs),
            },
            type_check: config.type_check.command.as_ref().map(|command| ShellStep {
                command: command.clone(),
                timeout: Duration::from_secs(config.type_check.timeout_secs),
            }),
            output_limit_bytes: config.test_runner.output_limit_bytes,
        }
    }
}

impl ValidationRunner for CommandValidationRunner {
    #[instrument(skip_all, fields(candidate = %request.candidate_path.display()))]
    fn validate(&self, request: &ValidationRequest) -> Result<AttemptResult> {
        let command = render_command(&self.test.command, &request.candidate_path);
        let mut result = match run_shell_command(
            &command,
            &request.workdir,
            self.test.timeout,
            self.output_limit_bytes,
        ) {
            Ok(output) => {
                debug!(exit_code = ?output.status.code(), "test runner finished");
                classify_test_output(&output.merged())
            }
            Err(err) => {
                warn!(err = %err, "test runner failed");
                return Ok(AttemptResult::runner_failure(format!("{err:#}")));
            }
        };

        if let Some(step) = &self.type_check {
            let command = render_command(&step.command, &request.candidate_path);
            let passed = match run_shell_command(
                &command,
                &request.workdir,
                step.timeout,
                self.output_limit_bytes,
            ) {
                Ok(output) => classify_type_check(&output.merged()),
                Err(err) => {
                    warn!(err = %err, "type check failed to run");
                    false
                }
            };
            debug!(passed, "type check finished");
            result = result.with_type_check(passed);
        }

        Ok(result)
    }
}

/// Substitute the quoted candidate path for `{file}`, or append it when the
/// template has no placeholder.
pub fn render_command(template: &str, candidate: &Path) -> String {
    let quoted = shell_quote(&candidate.to_string_lossy());
    if template.contains(FILE_PLACEHOLDER) {
        template.replace(FILE_PLACEHOLDER, &quoted)
    } else {
        format!("{template} {quoted}")
    }
}

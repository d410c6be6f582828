//! Batch migration for `migrator batch`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::io::agent::AgentClient;
use crate::io::config::MigratorConfig;
use crate::io::discovery::discover_tests;
use crate::io::validation::ValidationRunner;
use crate::orchestrator::{MigrationRequest, RunOutcome, promote_candidate, run_migration};

/// Per-file result of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchResult {
    Finished { outcome: RunOutcome },
    /// The run could not start or the candidate could not be promoted.
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchEntry {
    pub path: PathBuf,
    pub result: BatchResult,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub entries: Vec<BatchEntry>,
    pub passed: u32,
    pub not_passed: u32,
    pub errors: u32,
}

impl BatchSummary {
    fn record(&mut self, path: PathBuf, result: BatchResult) {
        match &result {
            BatchResult::Finished { outcome } if outcome.passed() => self.passed += 1,
            BatchResult::Finished { .. } => self.not_passed += 1,
            BatchResult::Error { .. } => self.errors += 1,
        }
        self.entries.push(BatchEntry { path, result });
    }

    pub fn all_passed(&self) -> bool {
        self.not_passed == 0 && self.errors == 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Replace each source test with its passing candidate.
    pub in_place: bool,
}

/// Migrate every discovered test under `dir`, one after another.
///
/// A file that fails to start or promote is recorded and the batch moves on.
/// `on_entry` is called after each file.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn run_batch<A, V, F>(
    config: &MigratorConfig,
    dir: &Path,
    workdir: &Path,
    options: BatchOptions,
    agent: &A,
    validator: &V,
    mut on_entry: F,
) -> Result<BatchSummary>
where
    A: AgentClient,
    V: ValidationRunner,
    F: FnMut(&BatchEntry),
{
    let files = discover_tests(dir, &config.discovery, &config.output_infix)?;
    info!(count = files.len(), "starting batch");

    let mut summary = BatchSummary::default();
    for path in files {
        let request = MigrationRequest {
            source_path: path.clone(),
            output_path: None,
            workdir: workdir.to_path_buf(),
        };
        let result = match run_migration(config, &request, agent, validator) {
            Ok(outcome) => promote_if_requested(options, outcome, &path),
            Err(err) => {
                error!(path = %path.display(), err = %format!("{err:#}"), "migration failed to start");
                BatchResult::Error {
                    message: format!("{err:#}"),
                }
            }
        };
        summary.record(path, result);
        if let Some(entry) = summary.entries.last() {
            on_entry(entry);
        }
    }

    info!(
        passed = summary.passed,
        not_passed = summary.not_passed,
        errors = summary.errors,
        "batch finished"
    );
    Ok(summary)
}

fn promote_if_requested(options: BatchOptions, outcome: RunOutcome, source: &Path) -> BatchResult {
    if options.in_place
        && outcome.passed()
        && let Err(err) = promote_candidate(&outcome, source)
    {
        warn!(path = %source.display(), err = %format!("{err:#}"), "failed to promote candidate");
        return BatchResult::Error {
            message: format!("{err:#}"),
        };
    }
    BatchResult::Finished { outcome }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        ScriptedAgent, ScriptedValidationRunner, failing_result, passing_result, submit,
    };
    use std::fs;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
    }

    #[test]
    fn batch_migrates_each_file_and_promotes_passing_ones() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        write(&root.join("src/A.test.tsx"), "shallow(<A />)");
        write(&root.join("src/B.test.tsx"), "shallow(<B />)");
        write(&root.join("src/C.test.tsx"), "render(<C />)");

        let config = MigratorConfig {
            max_attempts: 1,
            ..MigratorConfig::default()
        };
        let agent = ScriptedAgent::new(vec![submit("a1", "render(<A />)"), submit("b1", "oops")]);
        let validator = ScriptedValidationRunner::new(vec![passing_result(1), failing_result(0, 1)]);

        let mut seen = Vec::new();
        let summary = run_batch(
            &config,
            &root.join("src"),
            root,
            BatchOptions { in_place: true },
            &agent,
            &validator,
            |entry| seen.push(entry.path.clone()),
        )
        .expect("batch");

        assert_eq!(seen, vec![root.join("src/A.test.tsx"), root.join("src/B.test.tsx")]);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.not_passed, 1);
        assert_eq!(summary.errors, 0);
        assert!(!summary.all_passed());
        assert_eq!(
            fs::read_to_string(root.join("src/A.test.tsx")).expect("read"),
            "render(<A />)"
        );
        assert!(!root.join("src/A.migrated.test.tsx").exists());
        assert_eq!(
            fs::read_to_string(root.join("src/B.test.tsx")).expect("read"),
            "shallow(<B />)"
        );
        assert!(root.join("src/B.migrated.test.tsx").exists());
    }

    #[test]
    fn start_failure_is_recorded_and_batch_continues() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        write(&root.join("A.test.tsx"), "shallow(<A />)");
        write(&root.join("B.test.tsx"), "shallow(<B />)");

        let config = MigratorConfig {
            max_attempts: 1,
            instructions_path: Some(root.join("missing-instructions.md")),
            ..MigratorConfig::default()
        };
        let agent = ScriptedAgent::new(vec![]);
        let validator = ScriptedValidationRunner::new(vec![]);

        let summary = run_batch(
            &config,
            root,
            root,
            BatchOptions::default(),
            &agent,
            &validator,
            |_| {},
        )
        .expect("batch");

        assert_eq!(summary.errors, 2);
        assert_eq!(summary.entries.len(), 2);
        assert_eq!(agent.calls(), 0);
    }
}

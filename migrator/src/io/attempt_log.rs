//! Per-attempt artifacts under the configured attempt-log directory.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::run_state::RunState;
use crate::core::types::{AttemptResult, Conversation};

#[derive(Debug, Clone, Serialize)]
pub struct AttemptMeta<'a> {
    pub attempt: u32,
    pub source_path: &'a Path,
    pub output_path: &'a Path,
    pub did_pass: bool,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub total: u32,
    pub success_rate: u32,
    pub type_check_passed: Option<bool>,
}

impl<'a> AttemptMeta<'a> {
    pub fn new(
        attempt: u32,
        source_path: &'a Path,
        output_path: &'a Path,
        result: &AttemptResult,
    ) -> Self {
        Self {
            attempt,
            source_path,
            output_path,
            did_pass: result.did_pass,
            passed: result.passed,
            failed: result.failed,
            skipped: result.skipped,
            total: result.total,
            success_rate: result.success_rate,
            type_check_passed: result.type_check_passed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub candidate_path: PathBuf,
    pub runner_log_path: PathBuf,
}

/// Artifact layout for one source file: `<root>/<source path relative to the
/// workdir>/`, so equally named tests in different directories stay apart.
#[derive(Debug, Clone)]
pub struct AttemptLog {
    dir: PathBuf,
    extension: String,
}

impl AttemptLog {
    pub fn new(root: &Path, workdir: &Path, source_path: &Path) -> Self {
        let relative: PathBuf = source_path
            .strip_prefix(workdir)
            .unwrap_or(source_path)
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        let extension = source_path
            .extension()
            .map_or_else(|| "txt".into(), |e| e.to_string_lossy())
            .into_owned();
        Self {
            dir: root.join(relative),
            extension,
        }
    }

    /// Remove artifacts left by an earlier run of the same source file.
    pub fn reset(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("clear attempt log {}", self.dir.display()))
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn attempt_paths(&self, attempt: u32) -> AttemptPaths {
        let dir = self.dir.join(format!("attempt-{attempt}"));
        AttemptPaths {
            meta_path: dir.join("meta.json"),
            candidate_path: dir.join(format!("candidate.{}", self.extension)),
            runner_log_path: dir.join("runner.log"),
            dir,
        }
    }

    pub fn write_attempt(
        &self,
        meta: &AttemptMeta<'_>,
        candidate: &str,
        result: &AttemptResult,
    ) -> Result<AttemptPaths> {
        let paths = self.attempt_paths(meta.attempt);
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("create attempt dir {}", paths.dir.display()))?;

        write_json(&paths.meta_path, meta)?;
        write_text(&paths.candidate_path, candidate)?;
        write_text(&paths.runner_log_path, &result.runner_log)?;
        Ok(paths)
    }

    /// Write the conversation and final run state once the run has ended.
    pub fn write_summary(&self, conversation: &Conversation, state: &RunState) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create attempt log dir {}", self.dir.display()))?;
        write_json(&self.dir.join("transcript.json"), conversation)?;
        write_json(&self.dir.join("state.json"), state)
    }
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    write_text(path, &buf)
}

//! Shell command execution with a deadline and bounded output.

use std::collections::VecDeque;
use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured output of a finished shell command.
#[derive(Debug)]
pub struct ShellOutput {
    pub command: String,
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    /// stdout followed by stderr, the way a terminal would interleave them
    /// when the child writes its summary last.
    pub fn merged(&self) -> String {
        let mut buf = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        buf.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') && !self.stderr.is_empty() {
            buf.push('\n');
        }
        buf.push_str(&self.stderr);
        buf
    }
}

/// Raised when a command outlives its deadline. The child has been killed.
#[derive(Debug, Error)]
#[error("command timed out after {}s and was killed: {command}", .timeout.as_secs())]
pub struct CommandTimeout {
    pub command: String,
    pub timeout: Duration,
}

/// Run `command` through `sh -c` in `workdir`.
///
/// Output is drained concurrently so a chatty child cannot deadlock on a full
/// pipe. Each stream keeps only its last `output_limit_bytes`, so trailing
/// summaries survive noisy runs. When the deadline elapses the child is
/// killed and a [`CommandTimeout`] is returned.
#[instrument(skip_all, fields(command = %command, timeout_secs = timeout.as_secs()))]
pub fn run_shell_command(
    command: &str,
    workdir: &Path,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<ShellOutput> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn `{command}`"));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!("command timed out, killing");
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?;
            return Err(CommandTimeout {
                command: command.to_string(),
                timeout,
            }
            .into());
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), "command finished");
    Ok(ShellOutput {
        command: command.to_string(),
        status,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

/// Quote `value` for safe interpolation into a POSIX shell command.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut tail: VecDeque<u8> = VecDeque::with_capacity(limit.min(64 * 1024));
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        tail.extend(&chunk[..n]);
        if tail.len() > limit {
            let excess = tail.len() - limit;
            tail.drain(..excess);
            dropped += excess;
        }
    }

    Ok((tail.into(), dropped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_stderr() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = run_shell_command(
            "echo out; echo err 1>&2",
            temp.path(),
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        assert!(output.status.success());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.merged(), "out\nerr\n");
        assert_eq!(output.command, "echo out; echo err 1>&2");
    }

    #[test]
    fn nonzero_exit_is_not_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = run_shell_command("exit 3", temp.path(), Duration::from_secs(10), 1024)
            .expect("run");
        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn timeout_kills_and_reports() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = run_shell_command("sleep 5", temp.path(), Duration::from_millis(200), 1024)
            .expect_err("timeout");
        let timeout = err.downcast_ref::<CommandTimeout>().expect("timeout error");
        assert_eq!(timeout.command, "sleep 5");
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn output_beyond_limit_keeps_the_tail() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = run_shell_command(
            "printf 'abcdefghij'",
            temp.path(),
            Duration::from_secs(10),
            4,
        )
        .expect("run");
        assert_eq!(output.stdout, "ghij");
    }

    #[test]
    fn trailing_summary_survives_noisy_stderr() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = run_shell_command(
            "head -c 250000 /dev/zero | tr '\\0' x 1>&2; echo 'Tests:       4 passed, 4 total' 1>&2",
            temp.path(),
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        assert_eq!(output.stderr.len(), 1024);
        assert!(output.stderr.ends_with("Tests:       4 passed, 4 total\n"));
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}

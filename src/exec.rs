//! Process execution behind the [`Executor`] trait.
//!
//! Resources never spawn processes directly: they issue commands through an
//! [`Executor`], which is either the local [`SystemExecutor`] or one of the
//! transports in [`crate::connection`] (SSH, sudo).
use std::io::Write as _;
use std::process::{Command, Output, Stdio};

use anyhow::{Context as _, Result};

use crate::resources::error::ResourceError;

/// Result of a command execution.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

impl ExecResult {
    /// Turn a non-zero exit into a typed [`ResourceError`].
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::PermissionDenied`] when stderr reports a
    /// privilege failure, [`ResourceError::ExecutionFailed`] otherwise.
    pub fn check(self, program: &str) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            let code = self.code.unwrap_or(-1);
            Err(ResourceError::from_failure(program, code, &self.stderr).into())
        }
    }
}

/// Abstraction over command execution on a target host.
///
/// Implementations provide [`execute`](Self::execute); the checked and
/// convenience variants are derived from it. Implementations must be
/// thread-safe: hosts are provisioned in parallel.
pub trait Executor: Send + Sync + std::fmt::Debug {
    /// Run a command, optionally feeding `input` on stdin, and return its
    /// result regardless of exit status.
    ///
    /// # Errors
    ///
    /// Returns an error only if the command cannot be spawned (or, for
    /// remote transports, if the host cannot be reached).
    fn execute(&self, program: &str, args: &[&str], input: Option<&[u8]>) -> Result<ExecResult>;

    /// Run a command and fail if it exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or exits non-zero.
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        self.execute(program, args, None)?.check(program)
    }

    /// Run a command, returning its result regardless of exit status.
    ///
    /// # Errors
    ///
    /// Returns an error only if the command cannot be spawned.
    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        self.execute(program, args, None)
    }

    /// Run a command with `input` on stdin and fail if it exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or exits non-zero.
    fn run_with_input(&self, program: &str, args: &[&str], input: &[u8]) -> Result<ExecResult> {
        self.execute(program, args, Some(input))?.check(program)
    }

    /// Check whether `program` is available on the target's `PATH`.
    fn which(&self, program: &str) -> bool {
        let probe = format!("command -v {}", crate::connection::shell_quote(program));
        self.run_unchecked("sh", &["-c", &probe])
            .is_ok_and(|r| r.success)
    }
}

/// Runs commands as local processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn execute(&self, program: &str, args: &[&str], input: Option<&[u8]>) -> Result<ExecResult> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        spawn(cmd, program, input)
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Spawn a prepared command, optionally feeding `input` on stdin, and
/// collect its output without interpreting the exit status.
///
/// # Errors
///
/// Returns an error if the process cannot be spawned or waited on.
pub fn spawn(mut cmd: Command, label: &str, input: Option<&[u8]>) -> Result<ExecResult> {
    let Some(input) = input else {
        let output = cmd
            .output()
            .with_context(|| format!("failed to execute: {label}"))?;
        return Ok(ExecResult::from(output));
    };

    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to execute: {label}"))?;

    // Feed stdin from a separate thread so a child that fills its stdout
    // pipe before draining stdin cannot deadlock us.
    let writer = child.stdin.take().map(|mut stdin| {
        let data = input.to_vec();
        std::thread::spawn(move || stdin.write_all(&data))
    });

    let output = child
        .wait_with_output()
        .with_context(|| format!("failed to wait for: {label}"))?;

    if let Some(handle) = writer {
        match handle.join() {
            Ok(Ok(())) => {}
            // The child may legitimately exit without reading all input.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(e).with_context(|| format!("writing stdin of {label}")),
            Err(_) => anyhow::bail!("stdin writer for {label} panicked"),
        }
    }

    Ok(ExecResult::from(output))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn run_echo() {
        let result = SystemExecutor.run("echo", &["hello"]).unwrap();
        assert!(result.success, "echo command should succeed");
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[test]
    fn run_failure_is_typed() {
        let err = SystemExecutor.run("false", &[]).unwrap_err();
        assert!(
            matches!(
                err.downcast_ref::<ResourceError>(),
                Some(ResourceError::ExecutionFailed { .. })
            ),
            "unexpected error: {err:#}"
        );
    }

    #[test]
    fn run_unchecked_failure() {
        let result = SystemExecutor.run_unchecked("false", &[]).unwrap();
        assert!(!result.success, "non-zero exit should set success=false");
        assert_eq!(result.code, Some(1));
    }

    #[test]
    fn run_with_input_pipes_stdin() {
        let result = SystemExecutor
            .run_with_input("cat", &[], b"line one\nline two\n")
            .unwrap();
        assert_eq!(result.stdout, "line one\nline two\n");
    }

    #[test]
    fn run_with_input_tolerates_child_ignoring_stdin() {
        let result = SystemExecutor
            .run_with_input("true", &[], &vec![b'x'; 1 << 20])
            .unwrap();
        assert!(result.success);
    }

    #[test]
    fn which_finds_known_program() {
        assert!(SystemExecutor.which("sh"), "sh should be found on Unix");
    }

    #[test]
    fn which_missing_program() {
        assert!(
            !SystemExecutor.which("this-program-does-not-exist-12345"),
            "non-existent program should not be found"
        );
    }

    #[test]
    fn check_passes_success_through() {
        let ok = ExecResult {
            success: true,
            code: Some(0),
            ..ExecResult::default()
        };
        assert!(ok.check("true").is_ok());
    }
}

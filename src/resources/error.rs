//! Typed error variants for resource operations.
//!
//! Internal resource code returns these variants directly; callers convert
//! to [`anyhow::Error`] via `?`.

use thiserror::Error;

/// Errors that arise from resource checks and apply operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// A command invoked by a resource failed with a non-zero exit code.
    #[error("command '{program}' failed (exit {exit_code}): {stderr}")]
    ExecutionFailed {
        /// Name of the program that was invoked.
        program: String,
        /// Exit code returned by the process (`-1` when killed by a signal).
        exit_code: i32,
        /// Captured standard error output.
        stderr: String,
    },

    /// A required resource (file, package, etc.) was not found.
    #[error("resource not found: {resource}")]
    NotFound {
        /// Description of the missing resource.
        resource: String,
    },

    /// An operation was denied due to insufficient privilege on the target.
    #[error("permission denied running '{program}': {detail}")]
    PermissionDenied {
        /// Program that was refused.
        program: String,
        /// Diagnostic emitted by the target.
        detail: String,
    },

    /// A resource exists but is in an unexpected or inconsistent state.
    #[error("invalid state for '{resource}': {reason}")]
    InvalidState {
        /// Name or description of the resource in the invalid state.
        resource: String,
        /// Human-readable explanation of why the state is invalid.
        reason: String,
    },
}

/// Stderr fragments that indicate a privilege failure rather than a generic
/// command error.
const PERMISSION_MARKERS: &[&str] = &[
    "permission denied",
    "a password is required",
    "is not in the sudoers file",
    "operation not permitted",
    "only root can",
    "are you root",
];

impl ResourceError {
    /// Build the error for a failed command, classifying privilege failures.
    #[must_use]
    pub fn from_failure(program: &str, exit_code: i32, stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        if PERMISSION_MARKERS.iter().any(|m| lower.contains(m)) {
            Self::PermissionDenied {
                program: program.to_string(),
                detail: stderr.trim().to_string(),
            }
        } else {
            Self::ExecutionFailed {
                program: program.to_string(),
                exit_code,
                stderr: stderr.trim().to_string(),
            }
        }
    }
}

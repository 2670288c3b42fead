//! Core logging types: task entries, status, and the [`Log`] trait.
use serde::Serialize;

/// Task execution result for the end-of-run recap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskEntry {
    /// Host the task ran on; `None` for host-independent work.
    pub host: Option<String>,
    /// Human-readable task name.
    pub name: String,
    /// Final status of the task.
    pub status: TaskStatus,
    /// Optional detail message (e.g., skip reason or error description).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Status of a completed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The task modified the host.
    Changed,
    /// Everything was already in the desired state.
    Unchanged,
    /// The guard was false or the task was filtered out.
    Skipped,
    /// Task ran in dry-run mode; changes were reported, not applied.
    DryRun,
    /// Task encountered an error; later tasks on the host did not run.
    Failed,
    /// The host could not be reached; none of its tasks ran.
    Unreachable,
}

/// Abstraction over logging backends.
///
/// Both [`Logger`](super::logger::Logger) (direct output) and
/// [`BufferedLog`](super::buffered::BufferedLog) (deferred output for
/// hosts provisioned in parallel) implement this trait, allowing task code
/// to log without knowing whether output is immediate or buffered.
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log a dry-run action message.
    fn dry_run(&self, msg: &str);
    /// Record a task result for the recap.
    fn record_task(&self, name: &str, status: TaskStatus, message: Option<&str>);
}

//! Structured logger with dry-run awareness and recap collection.
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;

use super::types::{Log, TaskEntry, TaskStatus};
use super::utils::{format_utc_rfc3339, log_file_path, recap_file_path, terminal_columns};

/// Host label used for entries recorded without a host.
const NO_HOST: &str = "localhost";

/// Implement the display methods of [`Log`] by delegating to inherent methods
/// of the same name on the implementing type.
///
/// The `record_task` method is **not** included because its signature differs
/// from the `fn(&self, &str)` pattern shared by the display methods.
macro_rules! forward_log_methods {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                self.$method(msg);
            }
        )+
    };
}

/// Per-host task counts for the end-of-run recap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostRecap {
    /// Host name from the inventory.
    pub host: String,
    /// Tasks that modified the host.
    pub changed: usize,
    /// Tasks that found the host already converged.
    pub unchanged: usize,
    /// Tasks whose guard was false or that were filtered out.
    pub skipped: usize,
    /// Tasks that reported pending changes in dry-run mode.
    pub dry_run: usize,
    /// Tasks that failed.
    pub failed: usize,
    /// Whether the host could not be reached at all.
    pub unreachable: bool,
}

#[derive(Serialize)]
struct RecapDocument<'a> {
    command: &'a str,
    finished: String,
    hosts: &'a [HostRecap],
    tasks: &'a [TaskEntry],
}

/// Structured logger with dry-run awareness and recap collection.
///
/// All messages are always written to a persistent log file at
/// `$XDG_CACHE_HOME/devenv/<command>.log` (default `~/.cache/devenv/<command>.log`)
/// with timestamps and ANSI codes stripped, regardless of the verbose flag.
#[derive(Debug)]
pub struct Logger {
    command: String,
    tasks: Mutex<Vec<TaskEntry>>,
    log_file: Option<PathBuf>,
    /// Serializes console output from parallel host flushes.
    pub(super) flush_lock: Mutex<()>,
    /// Names of hosts currently being provisioned.
    pub(super) active_hosts: Mutex<Vec<String>>,
    /// Whether a progress line is currently displayed (`0` = no, `1` = yes).
    ///
    /// The progress line is always truncated to fit within a single terminal
    /// row, so the only valid values are `0` and `1`.
    pub(super) progress_rows: Mutex<u16>,
}

impl Logger {
    /// Create a new logger.
    ///
    /// Stores the log file path for display in the recap. The log file
    /// itself is created by [`init_subscriber`](super::subscriber::init_subscriber);
    /// this constructor does not write to it.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            tasks: Mutex::new(Vec::new()),
            log_file: log_file_path(command),
            flush_lock: Mutex::new(()),
            active_hosts: Mutex::new(Vec::new()),
            progress_rows: Mutex::new(0),
        }
    }

    /// Return the log file path, if available.
    #[cfg(test)]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Return a clone of all recorded task entries.
    #[must_use]
    pub fn task_entries(&self) -> Vec<TaskEntry> {
        self.tasks.lock().map_or_else(|_| vec![], |g| g.clone())
    }

    /// Return the current value of `progress_rows` (test-only).
    #[cfg(test)]
    pub(crate) fn progress_rows_count(&self) -> u16 {
        *self
            .progress_rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header (major section).
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: "devenv::stage", "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message (suppressed on console unless verbose; always
    /// written to the log file via the [`FileLayer`](super::subscriber::FileLayer)).
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Log a dry-run action message.
    pub fn dry_run(&self, msg: &str) {
        tracing::info!(target: "devenv::dry_run", "{msg}");
    }

    /// Record a task result that is not tied to a host.
    pub fn record_task(&self, name: &str, status: TaskStatus, message: Option<&str>) {
        self.push(None, name, status, message);
    }

    /// Record a task result for `host`.
    pub fn record_host_task(
        &self,
        host: &str,
        name: &str,
        status: TaskStatus,
        message: Option<&str>,
    ) {
        self.push(Some(host), name, status, message);
    }

    /// Record that `host` could not be reached.
    pub fn record_unreachable(&self, host: &str, reason: &str) {
        self.push(Some(host), "connect", TaskStatus::Unreachable, Some(reason));
    }

    fn push(&self, host: Option<&str>, name: &str, status: TaskStatus, message: Option<&str>) {
        if let Ok(mut guard) = self.tasks.lock() {
            guard.push(TaskEntry {
                host: host.map(String::from),
                name: name.to_string(),
                status,
                message: message.map(String::from),
            });
        }
    }

    /// Return `true` if any task failed or any host was unreachable.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }

    /// Count failed tasks plus unreachable hosts.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.tasks.lock().map_or(0, |guard| {
            guard
                .iter()
                .filter(|t| matches!(t.status, TaskStatus::Failed | TaskStatus::Unreachable))
                .count()
        })
    }

    /// Aggregate recorded entries per host, in order of first appearance.
    #[must_use]
    pub fn recap(&self) -> Vec<HostRecap> {
        let mut recap: Vec<HostRecap> = Vec::new();
        for task in &self.task_entries() {
            let host = task.host.as_deref().unwrap_or(NO_HOST);
            let index = if let Some(i) = recap.iter().position(|r| r.host == host) {
                i
            } else {
                recap.push(HostRecap {
                    host: host.to_string(),
                    ..HostRecap::default()
                });
                recap.len() - 1
            };
            let Some(entry) = recap.get_mut(index) else {
                continue;
            };
            match task.status {
                TaskStatus::Changed => entry.changed += 1,
                TaskStatus::Unchanged => entry.unchanged += 1,
                TaskStatus::Skipped => entry.skipped += 1,
                TaskStatus::DryRun => entry.dry_run += 1,
                TaskStatus::Failed => entry.failed += 1,
                TaskStatus::Unreachable => entry.unreachable = true,
            }
        }
        recap
    }

    /// Write the recap and every task entry as JSON to `last-run.json`.
    ///
    /// Returns the written path, or `None` when the cache directory is
    /// unavailable or the write fails.
    pub fn write_recap_json(&self) -> Option<PathBuf> {
        let path = recap_file_path()?;
        let hosts = self.recap();
        let tasks = self.task_entries();
        let doc = RecapDocument {
            command: &self.command,
            finished: format_utc_rfc3339(),
            hosts: &hosts,
            tasks: &tasks,
        };
        let json = serde_json::to_string_pretty(&doc).ok()?;
        std::fs::write(&path, json + "\n").ok()?;
        Some(path)
    }

    /// Print the recap of all recorded tasks.
    pub fn print_summary(&self) {
        let tasks = self.task_entries();
        if tasks.is_empty() {
            return;
        }

        println!();
        self.stage("Recap");

        for task in &tasks {
            let (icon, color) = match task.status {
                TaskStatus::Changed => ("✓", "\x1b[33m"),
                TaskStatus::Unchanged => ("✓", "\x1b[32m"),
                TaskStatus::Skipped => ("○", "\x1b[2m"),
                TaskStatus::DryRun => ("~", "\x1b[37m"),
                TaskStatus::Failed | TaskStatus::Unreachable => ("✗", "\x1b[31m"),
            };
            let host = task
                .host
                .as_ref()
                .map_or_else(String::new, |h| format!("[{h}] "));
            let suffix = task
                .message
                .as_ref()
                .map_or_else(String::new, |msg| format!(" ({msg})"));

            self.info(&format!("{color}{icon} {host}{}{suffix}\x1b[0m", task.name));
        }

        println!();
        for host in self.recap() {
            if host.unreachable {
                self.info(&format!(
                    "{}: \x1b[31munreachable\x1b[0m",
                    host.host
                ));
                continue;
            }
            self.info(&format!(
                "{}: \x1b[33m{} changed\x1b[0m, \x1b[32m{} unchanged\x1b[0m, \x1b[2m{} skipped\x1b[0m, \x1b[37m{} dry-run\x1b[0m, \x1b[31m{} failed\x1b[0m",
                host.host, host.changed, host.unchanged, host.skipped, host.dry_run, host.failed
            ));
        }

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
        if let Some(path) = self.write_recap_json() {
            self.debug(&format!("recap written to {}", path.display()));
        }
    }

    /// Erase the in-progress status line from the console.
    ///
    /// No-op if no progress line is currently shown.
    /// Must be called while holding `flush_lock`.
    pub(super) fn clear_progress(&self) {
        let mut guard = self
            .progress_rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *guard > 0 {
            print!("\r\x1b[K");
            std::io::stdout().flush().ok();
            *guard = 0;
        }
    }

    /// Print an in-progress status line to the console and mark it as shown.
    ///
    /// The host list is truncated to fit within a single terminal row so
    /// that [`clear_progress`](Self::clear_progress) never needs cursor-up
    /// movement.
    ///
    /// Must be called while holding `flush_lock`.
    pub(super) fn draw_progress(&self, names: &str) {
        let cols = terminal_columns();
        let prefix_width = 4;
        let max_name_chars = cols.saturating_sub(prefix_width);
        let display_names = if names.chars().count() > max_name_chars {
            let truncated: String = names
                .chars()
                .take(max_name_chars.saturating_sub(1))
                .collect();
            format!("{truncated}…")
        } else {
            names.to_string()
        };
        print!("  \x1b[2m▹ {display_names}\x1b[0m");
        std::io::stdout().flush().ok();
        let mut guard = self
            .progress_rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = 1;
    }

    /// Record that provisioning of `host` has started.
    ///
    /// Acquires the flush lock, erases any previous progress line, adds the
    /// host to the active set, and redraws the status line.
    pub fn notify_host_start(&self, host: &str) {
        let _guard = self
            .flush_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.clear_progress();
        let names = self.active_hosts.lock().map_or_else(
            |_| host.to_string(),
            |mut active| {
                active.push(host.to_string());
                active.join(", ")
            },
        );
        self.draw_progress(&names);
    }
}

impl Log for Logger {
    forward_log_methods!(stage, info, debug, warn, error, dry_run);

    fn record_task(&self, name: &str, status: TaskStatus, message: Option<&str>) {
        self.record_task(name, status, message);
    }
}

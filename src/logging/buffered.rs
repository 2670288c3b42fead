//! Buffered logger for hosts provisioned in parallel.
use std::sync::{Arc, Mutex};

use super::logger::Logger;
use super::types::{Log, TaskStatus};

/// A single buffered log entry, replayed when flushed.
#[derive(Debug, Clone)]
enum LogEntry {
    Stage(String),
    Info(String),
    Debug(String),
    Warn(String),
    Error(String),
    DryRun(String),
}

impl LogEntry {
    /// Replay this entry to the console and log file via tracing.
    fn replay(&self) {
        match self {
            Self::Stage(msg) => tracing::info!(target: "devenv::stage", "{msg}"),
            Self::Info(msg) => tracing::info!("{msg}"),
            Self::Debug(msg) => tracing::debug!("{msg}"),
            Self::Warn(msg) => tracing::warn!("{msg}"),
            Self::Error(msg) => tracing::error!("{msg}"),
            Self::DryRun(msg) => tracing::info!(target: "devenv::dry_run", "{msg}"),
        }
    }
}

/// Implement the display methods of [`Log`] by buffering each message into
/// `self.entries` as the corresponding [`LogEntry`] variant.
macro_rules! buffer_log_methods {
    ($($method:ident => $variant:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                if let Ok(mut guard) = self.entries.lock() {
                    guard.push(LogEntry::$variant(msg.to_string()));
                }
            }
        )+
    };
}

/// Buffered logger for one host.
///
/// Captures display output in memory so that hosts provisioned in parallel
/// do not interleave their console output. The captured entries are
/// replayed as one block when [`flush_and_complete`](Self::flush_and_complete)
/// is called.
///
/// [`record_task`](Log::record_task) is forwarded directly to the underlying
/// [`Logger`], stamped with the host name.
#[derive(Debug)]
pub struct BufferedLog {
    inner: Arc<Logger>,
    host: String,
    entries: Mutex<Vec<LogEntry>>,
}

impl BufferedLog {
    /// Create a buffered logger for `host` backed by the given [`Logger`].
    #[must_use]
    pub fn for_host(inner: Arc<Logger>, host: &str) -> Self {
        Self {
            inner,
            host: host.to_string(),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Host this log records tasks for.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Record that the host could not be reached.
    pub fn record_unreachable(&self, reason: &str) {
        self.inner.record_unreachable(&self.host, reason);
    }

    /// Replay all buffered entries to the backing [`Logger`].
    #[cfg(test)]
    pub fn flush(&self) {
        let entries = match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        for entry in &entries {
            entry.replay();
        }
    }

    /// Flush all buffered entries and remove the host from the active set.
    ///
    /// Acquires the flush lock on the backing [`Logger`] to prevent
    /// interleaved console output when several hosts finish together.
    pub fn flush_and_complete(&self) {
        let _guard = self
            .inner
            .flush_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.inner.clear_progress();
        let entries = match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        for entry in &entries {
            entry.replay();
        }
        let remaining = self.inner.active_hosts.lock().ok().and_then(|mut active| {
            active.retain(|n| n != &self.host);
            (!active.is_empty()).then(|| active.join(", "))
        });
        if let Some(names) = remaining {
            self.inner.draw_progress(&names);
        }
    }
}

impl Log for BufferedLog {
    buffer_log_methods! {
        stage   => Stage,
        info    => Info,
        debug   => Debug,
        warn    => Warn,
        error   => Error,
        dry_run => DryRun,
    }

    fn record_task(&self, name: &str, status: TaskStatus, message: Option<&str>) {
        self.inner
            .record_host_task(&self.host, name, status, message);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::logging::isolated_logger;
    use std::fs;

    #[test]
    fn record_task_is_stamped_with_host() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        let buf = BufferedLog::for_host(Arc::clone(&log), "devbox");
        buf.record_task("packages: install", TaskStatus::Changed, None);
        let entries = log.task_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].host.as_deref(), Some("devbox"));
        assert_eq!(entries[0].name, "packages: install");
    }

    #[test]
    fn record_unreachable_forwards_to_logger() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        let buf = BufferedLog::for_host(Arc::clone(&log), "gone");
        buf.record_unreachable("No route to host");
        assert!(log.recap()[0].unreachable);
    }

    #[test]
    fn flush_replays_to_file() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        let buf = BufferedLog::for_host(Arc::clone(&log), "devbox");
        let marker = format!("buf-marker-{}", std::process::id());
        buf.info(&marker);
        let path = log.log_path().expect("log path");
        let before = fs::read_to_string(path).unwrap();
        assert!(
            !before.contains(&marker),
            "buffered output should not be written before flush"
        );
        buf.flush();
        let after = fs::read_to_string(path).unwrap();
        assert!(after.contains(&marker));
    }

    #[test]
    fn flush_preserves_entry_order() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        let buf = BufferedLog::for_host(Arc::clone(&log), "devbox");
        buf.stage("stage-1");
        buf.info("info-1");
        buf.debug("debug-1");
        buf.warn("warn-1");
        buf.dry_run("dry-1");
        buf.error("error-1");
        buf.flush();
        let contents = fs::read_to_string(log.log_path().expect("log path")).unwrap();
        let positions: Vec<usize> = ["stage-1", "info-1", "debug-1", "warn-1", "dry-1", "error-1"]
            .iter()
            .map(|m| contents.find(m).expect("marker in log"))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
    }

    #[test]
    fn flush_and_complete_clears_progress_rows() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        log.notify_host_start("devbox");
        let buf = BufferedLog::for_host(Arc::clone(&log), "devbox");
        buf.flush_and_complete();
        assert_eq!(log.progress_rows_count(), 0);
    }

    #[test]
    #[allow(clippy::significant_drop_tightening)]
    fn flush_and_complete_keeps_other_hosts_active() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        log.notify_host_start("web");
        log.notify_host_start("db");
        BufferedLog::for_host(Arc::clone(&log), "web").flush_and_complete();
        let active = log.active_hosts.lock().unwrap();
        assert_eq!(*active, vec!["db".to_string()]);
    }
}

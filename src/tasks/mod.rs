//! Named, guarded tasks grouped into roles.
//!
//! A playbook lists roles; each role expands to a fixed sequence of tasks.
//! Per host, tasks run strictly in order and the first failure stops the
//! host's remaining tasks.
pub mod context;
pub mod deploy;
pub mod packages;
mod processing;
pub mod tmux;
pub mod user;

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

pub use context::Context;
pub use processing::{
    ProcessOpts, TaskResult, TaskStats, process_resources, process_single,
};

use crate::error::TaskError;
use crate::logging::TaskStatus;

/// A named, executable task.
pub trait Task: Send + Sync {
    /// Human-readable task name, prefixed with its role (`"role: action"`).
    fn name(&self) -> &str;

    /// Role this task belongs to.
    fn role(&self) -> &str;

    /// Guard: whether this task applies to the current run.
    fn should_run(&self, ctx: &Context) -> bool;

    /// Reason recorded when [`should_run`](Self::should_run) is false.
    fn skip_reason(&self) -> &str {
        "not applicable"
    }

    /// Execute the task.
    ///
    /// # Errors
    ///
    /// Returns an error if a command fails, a variable is unusable, or a
    /// resource is in a state the task cannot converge.
    fn run(&self, ctx: &Context) -> Result<TaskResult>;
}

/// Tasks of `role`, in execution order. Unknown roles have no tasks.
#[must_use]
pub fn role_tasks(role: &str) -> Vec<Box<dyn Task>> {
    match role {
        "user" => vec![
            Box::new(user::CreateUser),
            Box::new(user::AuthorizeSshKey),
            Box::new(user::GrantPasswordlessSudo),
        ],
        "packages" => vec![Box::new(packages::InstallPackages)],
        "bash" => vec![Box::new(deploy::DeployFiles::new("bash"))],
        "tmux" => vec![
            Box::new(deploy::DeployFiles::new("tmux")),
            Box::new(tmux::InstallTmuxPluginManager),
        ],
        "neovim" => vec![Box::new(deploy::DeployFiles::new("neovim"))],
        _ => Vec::new(),
    }
}

/// Tasks for every role in `roles`, in order.
#[must_use]
pub fn playbook_tasks(roles: &[String]) -> Vec<Box<dyn Task>> {
    roles.iter().flat_map(|r| role_tasks(r)).collect()
}

/// Selects tasks by `--skip` / `--only` patterns.
///
/// A pattern matches when it is a case-insensitive substring of the task's
/// role or name. `only` takes precedence over `skip`.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    skip: Vec<String>,
    only: Vec<String>,
}

impl TaskFilter {
    /// Build a filter from raw command-line patterns.
    #[must_use]
    pub fn new(skip: &[String], only: &[String]) -> Self {
        let lower = |v: &[String]| v.iter().map(|s| s.to_lowercase()).collect();
        Self {
            skip: lower(skip),
            only: lower(only),
        }
    }

    /// Whether `task` is selected.
    #[must_use]
    pub fn selects(&self, task: &dyn Task) -> bool {
        let name = task.name().to_lowercase();
        let role = task.role().to_lowercase();
        let hit = |p: &String| name.contains(p.as_str()) || role.contains(p.as_str());
        if !self.only.is_empty() {
            return self.only.iter().any(hit);
        }
        !self.skip.iter().any(hit)
    }
}

/// Execute a task, recording the result in the logger.
///
/// Returns `false` when the task failed and the host must stop.
pub fn execute(task: &dyn Task, ctx: &Context) -> bool {
    if !task.should_run(ctx) {
        ctx.log
            .debug(&format!("skipping task: {} ({})", task.name(), task.skip_reason()));
        ctx.log
            .record_task(task.name(), TaskStatus::Skipped, Some(task.skip_reason()));
        return true;
    }

    ctx.log.stage(&format!("[{}] {}", ctx.host.name, task.name()));

    match task.run(ctx) {
        Ok(TaskResult::Changed) => {
            ctx.log.record_task(task.name(), TaskStatus::Changed, None);
        }
        Ok(TaskResult::Unchanged) => {
            ctx.log.record_task(task.name(), TaskStatus::Unchanged, None);
        }
        Ok(TaskResult::Skipped(reason)) => {
            ctx.log.info(&format!("skipped: {reason}"));
            ctx.log
                .record_task(task.name(), TaskStatus::Skipped, Some(&reason));
        }
        Ok(TaskResult::DryRun) => {
            ctx.log.record_task(task.name(), TaskStatus::DryRun, None);
        }
        Err(e) => {
            let reason = format!("{e:#}");
            ctx.log.error(
                &TaskError::ExecutionFailed {
                    task: task.name().to_string(),
                    reason: reason.clone(),
                }
                .to_string(),
            );
            ctx.log
                .record_task(task.name(), TaskStatus::Failed, Some(&reason));
            return false;
        }
    }
    true
}

/// Run `tasks` against the context's host, in order.
///
/// Tasks rejected by `filter` are recorded as skipped. The run stops at the
/// first failed task, or before the next task once `interrupted` is set.
/// Returns `true` when every selected task succeeded.
pub fn run_host(
    tasks: &[Box<dyn Task>],
    ctx: &Context,
    filter: &TaskFilter,
    interrupted: &AtomicBool,
) -> bool {
    for task in tasks {
        if interrupted.load(Ordering::SeqCst) {
            ctx.log
                .warn(&TaskError::Interrupted(task.name().to_string()).to_string());
            return false;
        }
        if !filter.selects(task.as_ref()) {
            ctx.log
                .record_task(task.name(), TaskStatus::Skipped, Some("filtered out"));
            continue;
        }
        if !execute(task.as_ref(), ctx) {
            ctx.log.warn(&format!(
                "stopping {} after failed task '{}'",
                ctx.host.name,
                task.name()
            ));
            return false;
        }
    }
    true
}

/// Shared helpers for task unit tests.
#[cfg(test)]
pub mod test_helpers {
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::config::Config;
    use crate::config::files::{FileEntry, Manifest};
    use crate::config::inventory::{Host, Inventory};
    use crate::config::playbook::Playbook;
    use crate::config::vars::Vars;
    use crate::exec::Executor;
    use crate::logging::{Log, Logger};
    use crate::resources::test_helpers::MockExecutor;

    use super::Context;

    /// Builds a [`Context`] for user `alice` on `localhost`.
    ///
    /// The default executor is a [`MockExecutor`] that fails every call.
    #[derive(Debug)]
    pub struct ContextBuilder {
        vars: Vars,
        roles: Vec<String>,
        files: Manifest,
        root: PathBuf,
        executor: Arc<dyn Executor>,
        dry_run: bool,
        become_root: bool,
        login_uid: Option<u32>,
    }

    impl ContextBuilder {
        /// Start from default variables with `user_name = "alice"`.
        #[must_use]
        pub fn new() -> Self {
            Self {
                vars: Vars {
                    user_name: "alice".to_string(),
                    ..Vars::default()
                },
                roles: crate::config::playbook::KNOWN_ROLES
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                files: Manifest::default(),
                root: PathBuf::from("/nonexistent"),
                executor: Arc::new(MockExecutor::with_responses(vec![])),
                dry_run: false,
                become_root: false,
                login_uid: None,
            }
        }

        /// Edit the variables.
        #[must_use]
        pub fn vars(mut self, edit: impl FnOnce(&mut Vars)) -> Self {
            edit(&mut self.vars);
            self
        }

        /// Use `executor` for every command.
        #[must_use]
        pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
            self.executor = executor;
            self
        }

        /// Repository root holding `files/`.
        #[must_use]
        pub fn root(mut self, root: PathBuf) -> Self {
            self.root = root;
            self
        }

        /// Add a manifest entry for `role`.
        #[must_use]
        pub fn file(mut self, role: &str, source: &str, target: &str) -> Self {
            self.files.insert(
                role,
                FileEntry {
                    source: source.to_string(),
                    target: target.to_string(),
                    mode: crate::config::files::DEFAULT_MODE,
                },
            );
            self
        }

        /// Enable dry-run mode.
        #[must_use]
        pub const fn dry_run(mut self) -> Self {
            self.dry_run = true;
            self
        }

        /// Escalate with passwordless sudo.
        #[must_use]
        pub const fn become_root(mut self) -> Self {
            self.become_root = true;
            self
        }

        /// Uid the login user has on the host.
        #[must_use]
        pub const fn login_uid(mut self, uid: u32) -> Self {
            self.login_uid = Some(uid);
            self
        }

        /// Build the context and return the logger that records its tasks.
        #[must_use]
        pub fn build(self) -> (Context, Arc<Logger>) {
            let config = Config {
                root: self.root,
                playbook: Playbook {
                    name: "test".to_string(),
                    roles: self.roles,
                    vars: toml::Table::new(),
                },
                vars: self.vars,
                inventory: Inventory::local(),
                files: self.files,
            };
            let log = Arc::new(Logger::new("test"));
            let ctx = Context::new(
                Arc::new(config),
                Host::local("localhost"),
                Arc::clone(&log) as Arc<dyn Log>,
                self.dry_run,
                self.executor,
            );
            let ctx = match self.login_uid {
                Some(uid) => ctx.with_login_uid(uid),
                None => ctx,
            };
            let ctx = if self.become_root {
                ctx.with_become(None)
            } else {
                ctx
            };
            (ctx, log)
        }
    }
}

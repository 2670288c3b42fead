//! Per-host state shared by every task.
use std::sync::{Arc, OnceLock};

use anyhow::Result;

use crate::config::Config;
use crate::config::inventory::Host;
use crate::config::vars::Vars;
use crate::connection::Elevated;
use crate::exec::Executor;
use crate::logging::Log;
use crate::resources::user;

/// Shared context for the tasks run against one host.
pub struct Context {
    /// Configuration and variables, immutable for the whole run.
    pub config: Arc<Config>,
    /// Host being provisioned.
    pub host: Host,
    /// Logger for output and task recording.
    pub log: Arc<dyn Log>,
    /// Whether to perform a dry run (report changes without applying).
    pub dry_run: bool,
    /// Executor running commands as the login user.
    pub executor: Arc<dyn Executor>,
    elevated: Option<Elevated>,
    login_uid: Option<u32>,
    user_home: OnceLock<String>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("host", &self.host.name)
            .field("log", &"<dyn Log>")
            .field("dry_run", &self.dry_run)
            .field("executor", &self.executor)
            .field("elevated", &self.elevated.is_some())
            .field("login_uid", &self.login_uid)
            .field("user_home", &self.user_home.get())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Create a context that runs every command as the login user.
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        host: Host,
        log: Arc<dyn Log>,
        dry_run: bool,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            config,
            host,
            log,
            dry_run,
            executor,
            elevated: None,
            login_uid: None,
            user_home: OnceLock::new(),
        }
    }

    /// Record the uid commands run as on the host, as reported by the
    /// connection probe.
    #[must_use]
    pub const fn with_login_uid(mut self, uid: u32) -> Self {
        self.login_uid = Some(uid);
        self
    }

    /// Run privileged commands through sudo, authenticating with `password`
    /// when given.
    #[must_use]
    pub fn with_become(mut self, password: Option<Arc<str>>) -> Self {
        self.elevated = Some(Elevated::new(Arc::clone(&self.executor), password));
        self
    }

    /// Resolved variables.
    #[must_use]
    pub fn vars(&self) -> &Vars {
        &self.config.vars
    }

    /// Whether privileged commands go through sudo.
    #[must_use]
    pub const fn elevates(&self) -> bool {
        self.elevated.is_some()
    }

    /// Whether commands on the host can change file ownership: either
    /// through sudo or because the login user is root.
    #[must_use]
    pub const fn can_chown(&self) -> bool {
        self.elevated.is_some() || matches!(self.login_uid, Some(0))
    }

    /// Executor for commands that need root.
    ///
    /// Without `--become` this is the login executor, which is enough when
    /// the login user is already root.
    #[must_use]
    pub fn privileged(&self) -> &dyn Executor {
        match &self.elevated {
            Some(elevated) => elevated,
            None => self.executor.as_ref(),
        }
    }

    /// Executor for commands that must run as the target user, so that
    /// whatever they create belongs to that user.
    ///
    /// A root login switches to the user through sudo as well; any other
    /// login without `--become` runs the commands itself.
    #[must_use]
    pub fn as_target_user(&self) -> Arc<dyn Executor> {
        let user = &self.vars().user_name;
        match &self.elevated {
            Some(elevated) => Arc::new(elevated.as_user(user)),
            None if self.can_chown() && user != "root" => {
                Arc::new(Elevated::new(Arc::clone(&self.executor), None).as_user(user))
            }
            None => Arc::clone(&self.executor),
        }
    }

    /// Owner and group applied to files in the user's home.
    ///
    /// Ownership is enforced whenever the host allows it (see
    /// [`can_chown`](Self::can_chown)); the group is only set for accounts
    /// this run manages.
    #[must_use]
    pub fn home_ownership(&self) -> (Option<&str>, Option<&str>) {
        if !self.can_chown() {
            return (None, None);
        }
        let vars = self.vars();
        let group = vars.create_user.then_some(vars.user_group.as_str());
        (Some(vars.user_name.as_str()), group)
    }

    /// Home directory of the target user.
    ///
    /// Uses `user_home` when set, otherwise the account's `passwd` entry on
    /// the host. In dry-run mode a not-yet-created account is assumed to
    /// live in `/home/<user>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails or the account does not exist.
    pub fn user_home(&self) -> Result<String> {
        if let Some(home) = self.user_home.get() {
            return Ok(home.clone());
        }
        let vars = self.vars();
        let home = if let Some(home) = &vars.user_home {
            home.clone()
        } else if let Some(entry) = user::lookup(self.executor.as_ref(), &vars.user_name)? {
            entry.home
        } else if self.dry_run {
            format!("/home/{}", vars.user_name)
        } else {
            anyhow::bail!(
                "user '{}' does not exist on {}; enable create_user or set user_home",
                vars.user_name,
                self.host.name
            );
        };
        self.log.debug(&format!("home directory: {home}"));
        let _ = self.user_home.set(home.clone());
        Ok(home)
    }

    /// Create a copy of this context with a different logger.
    #[must_use]
    pub fn with_log(&self, log: Arc<dyn Log>) -> Self {
        Self {
            config: Arc::clone(&self.config),
            host: self.host.clone(),
            log,
            dry_run: self.dry_run,
            executor: Arc::clone(&self.executor),
            elevated: self.elevated.clone(),
            login_uid: self.login_uid,
            user_home: self.user_home.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::resources::test_helpers::MockExecutor;
    use crate::tasks::test_helpers::ContextBuilder;

    #[test]
    fn user_home_prefers_variable() {
        let (ctx, _log) = ContextBuilder::new()
            .vars(|v| v.user_home = Some("/srv/alice".to_string()))
            .build();
        assert_eq!(ctx.user_home().unwrap(), "/srv/alice");
    }

    #[test]
    fn user_home_looked_up_once() {
        let executor = Arc::new(MockExecutor::ok("alice:x:1001:0::/home/alice:/bin/bash\n"));
        let (ctx, _log) = ContextBuilder::new()
            .executor(Arc::clone(&executor) as Arc<dyn Executor>)
            .build();
        assert_eq!(ctx.user_home().unwrap(), "/home/alice");
        assert_eq!(ctx.user_home().unwrap(), "/home/alice");
        assert_eq!(executor.call_count(), 1);
    }

    #[test]
    fn user_home_missing_account_fails() {
        let (ctx, _log) = ContextBuilder::new()
            .executor(Arc::new(MockExecutor::fail()))
            .build();
        let err = ctx.user_home().unwrap_err();
        assert!(err.to_string().contains("does not exist"), "{err}");
    }

    #[test]
    fn user_home_missing_account_assumed_in_dry_run() {
        let (ctx, _log) = ContextBuilder::new()
            .executor(Arc::new(MockExecutor::fail()))
            .dry_run()
            .build();
        assert_eq!(ctx.user_home().unwrap(), "/home/alice");
    }

    #[test]
    fn privileged_wraps_sudo_only_with_become() {
        let executor = Arc::new(MockExecutor::ok("").with_fallback(true, ""));
        let (ctx, _log) = ContextBuilder::new()
            .executor(Arc::clone(&executor) as Arc<dyn Executor>)
            .build();
        ctx.privileged().run("id", &[]).unwrap();
        let ctx = ctx.with_become(None);
        ctx.privileged().run("id", &[]).unwrap();
        ctx.as_target_user().run("id", &[]).unwrap();
        assert_eq!(
            executor.calls(),
            vec!["id", "sudo -n -- id", "sudo -n -H -u alice -- id"]
        );
    }

    #[test]
    fn home_ownership_only_when_elevating() {
        let (ctx, _log) = ContextBuilder::new().build();
        assert_eq!(ctx.home_ownership(), (None, None));
        let ctx = ctx.with_become(None);
        assert_eq!(ctx.home_ownership(), (Some("alice"), Some("root")));
    }

    #[test]
    fn home_ownership_when_login_is_root() {
        let (ctx, _log) = ContextBuilder::new().login_uid(0).build();
        assert!(ctx.can_chown());
        assert_eq!(ctx.home_ownership(), (Some("alice"), Some("root")));

        let (ctx, _log) = ContextBuilder::new().login_uid(1000).build();
        assert!(!ctx.can_chown());
        assert_eq!(ctx.home_ownership(), (None, None));
    }

    #[test]
    fn root_login_switches_to_target_user() {
        let executor = Arc::new(MockExecutor::ok("").with_fallback(true, ""));
        let (ctx, _log) = ContextBuilder::new()
            .executor(Arc::clone(&executor) as Arc<dyn Executor>)
            .login_uid(0)
            .build();
        ctx.privileged().run("id", &[]).unwrap();
        ctx.as_target_user().run("id", &[]).unwrap();
        assert_eq!(executor.calls(), vec!["id", "sudo -n -H -u alice -- id"]);
    }

    #[test]
    fn root_target_user_runs_directly() {
        let executor = Arc::new(MockExecutor::ok(""));
        let (ctx, _log) = ContextBuilder::new()
            .vars(|v| v.user_name = "root".to_string())
            .executor(Arc::clone(&executor) as Arc<dyn Executor>)
            .login_uid(0)
            .build();
        ctx.as_target_user().run("id", &[]).unwrap();
        assert_eq!(executor.calls(), vec!["id"]);
    }

    #[test]
    fn home_ownership_leaves_group_of_unmanaged_account() {
        let (ctx, _log) = ContextBuilder::new()
            .vars(|v| v.create_user = false)
            .become_root()
            .build();
        assert_eq!(ctx.home_ownership(), (Some("alice"), None));
    }

    #[test]
    fn with_log_preserves_other_fields() {
        let (ctx, _log) = ContextBuilder::new()
            .dry_run()
            .become_root()
            .login_uid(0)
            .build();
        let log: Arc<dyn Log> = Arc::new(crate::logging::Logger::new("other"));
        let ctx2 = ctx.with_log(log);
        assert_eq!(ctx2.login_uid, Some(0));
        assert!(ctx2.dry_run);
        assert!(ctx2.elevates());
        assert_eq!(ctx2.host.name, ctx.host.name);
    }

    #[test]
    fn debug_format_includes_key_fields() {
        let (ctx, _log) = ContextBuilder::new().build();
        let debug = format!("{ctx:?}");
        assert!(debug.contains("Context"));
        assert!(debug.contains("dry_run"));
        assert!(debug.contains("localhost"));
    }
}

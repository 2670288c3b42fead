//! `user` role: account, authorized key, passwordless sudo.
use anyhow::Result;

use super::{Context, ProcessOpts, Task, TaskResult, TaskStats, process_resources, process_single};
use crate::config::validation::{SshPublicKey, check_user_name};
use crate::resources::Resource as _;
use crate::resources::authorized_key::AuthorizedKeyResource;
use crate::resources::file::{ManagedDirResource, ManagedFileResource};
use crate::resources::user::UserAccountResource;

const ROLE: &str = "user";
const SKIP_REASON: &str = "create_user is false";

/// Mode of `~/.ssh`.
const SSH_DIR_MODE: u32 = 0o700;
/// Mode of a sudoers drop-in.
const SUDOERS_MODE: u32 = 0o440;
/// Directory `sudo` reads drop-ins from.
const SUDOERS_DIR: &str = "/etc/sudoers.d";

/// Content of the sudoers drop-in granting `user` passwordless sudo.
#[must_use]
pub fn sudoers_entry(user: &str) -> String {
    format!("{user} ALL=(ALL) NOPASSWD: ALL\n")
}

/// Ensure the account exists with the configured shell and groups.
#[derive(Debug)]
pub struct CreateUser;

impl Task for CreateUser {
    fn name(&self) -> &'static str {
        "user: create account"
    }

    fn role(&self) -> &'static str {
        ROLE
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.vars().create_user
    }

    fn skip_reason(&self) -> &'static str {
        SKIP_REASON
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let vars = ctx.vars();
        check_user_name(&vars.user_name)?;
        let account = UserAccountResource::new(
            vars.user_name.clone(),
            vars.user_shell.clone(),
            vars.user_group.clone(),
            vars.user_groups.clone(),
            ctx.privileged(),
        );
        process_resources(ctx, [account], &ProcessOpts::strict("configure"))
    }
}

/// Ensure `ssh_public_key` is in the account's `authorized_keys`.
#[derive(Debug)]
pub struct AuthorizeSshKey;

impl Task for AuthorizeSshKey {
    fn name(&self) -> &'static str {
        "user: authorize ssh key"
    }

    fn role(&self) -> &'static str {
        ROLE
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.vars().create_user
    }

    fn skip_reason(&self) -> &'static str {
        SKIP_REASON
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let vars = ctx.vars();
        let key = SshPublicKey::parse(&vars.ssh_public_key)?;
        let home = ctx.user_home()?;
        let ssh_dir = format!("{}/.ssh", home.trim_end_matches('/'));
        let privileged = ctx.privileged();

        let dir = ManagedDirResource::new(ssh_dir.clone(), SSH_DIR_MODE, privileged)
            .owned_by(Some(&vars.user_name), Some(&vars.user_group))
            .strict();
        let keys = AuthorizedKeyResource::new(
            format!("{ssh_dir}/authorized_keys"),
            key,
            &vars.user_name,
            &vars.user_group,
            privileged,
        )
        .staged_with(ctx.executor.as_ref());

        let opts = ProcessOpts::strict("authorize");
        let mut stats = TaskStats::new();
        stats += process_single(ctx, &dir, dir.current_state()?, &opts)?;
        stats += process_single(ctx, &keys, keys.current_state()?, &opts)?;
        Ok(stats.finish(ctx))
    }
}

/// Install `/etc/sudoers.d/<user>` granting passwordless sudo.
#[derive(Debug)]
pub struct GrantPasswordlessSudo;

impl Task for GrantPasswordlessSudo {
    fn name(&self) -> &'static str {
        "user: grant passwordless sudo"
    }

    fn role(&self) -> &'static str {
        ROLE
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.vars().create_user
    }

    fn skip_reason(&self) -> &'static str {
        SKIP_REASON
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let user = &ctx.vars().user_name;
        check_user_name(user)?;
        let privileged = ctx.privileged();

        let file = ManagedFileResource::new(
            format!("{SUDOERS_DIR}/{user}"),
            sudoers_entry(user).into_bytes(),
            SUDOERS_MODE,
            privileged,
        )
        .owned_by(Some("root"), Some("root"))
        .staged_with(ctx.executor.as_ref());

        let file = if privileged.which("visudo") {
            file.validated_by_visudo()
        } else {
            ctx.log
                .warn("visudo not found; installing sudoers entry unchecked");
            file
        };
        process_resources(ctx, [file], &ProcessOpts::strict("install"))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::exec::Executor;
    use crate::resources::file::sha256_hex;
    use crate::resources::test_helpers::MockExecutor;
    use crate::tasks::test_helpers::ContextBuilder;
    use std::sync::Arc;

    const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAABAgMEBQYHCAkKCwwNDg8QERITFBUWFxgZGhscHR4f alice@laptop";

    fn mock(responses: Vec<(bool, &str)>) -> Arc<MockExecutor> {
        Arc::new(
            MockExecutor::with_responses(
                responses
                    .into_iter()
                    .map(|(ok, out)| (ok, out.to_string()))
                    .collect(),
            )
            .with_fallback(true, ""),
        )
    }

    #[test]
    fn sudoers_entry_format() {
        assert_eq!(sudoers_entry("alice"), "alice ALL=(ALL) NOPASSWD: ALL\n");
    }

    #[test]
    fn guards_follow_create_user() {
        let (ctx, _log) = ContextBuilder::new().vars(|v| v.create_user = false).build();
        assert!(!CreateUser.should_run(&ctx));
        assert!(!AuthorizeSshKey.should_run(&ctx));
        assert!(!GrantPasswordlessSudo.should_run(&ctx));
        assert_eq!(CreateUser.skip_reason(), "create_user is false");

        let (ctx, _log) = ContextBuilder::new().build();
        assert!(CreateUser.should_run(&ctx));
    }

    #[test]
    fn create_user_adds_missing_account() {
        let executor = mock(vec![(false, ""), (false, "")]);
        let (ctx, _log) = ContextBuilder::new()
            .executor(Arc::clone(&executor) as Arc<dyn Executor>)
            .build();
        assert_eq!(CreateUser.run(&ctx).unwrap(), TaskResult::Changed);
        assert_eq!(
            executor.calls(),
            vec![
                "getent passwd alice",
                "getent passwd alice",
                "useradd -m -s /bin/bash -g root alice",
            ]
        );
    }

    #[test]
    fn create_user_unchanged_when_account_matches() {
        let executor = mock(vec![
            (true, "alice:x:1001:0::/home/alice:/bin/bash\n"),
            (true, "root\n"),
        ]);
        let (ctx, _log) = ContextBuilder::new()
            .executor(Arc::clone(&executor) as Arc<dyn Executor>)
            .build();
        assert_eq!(CreateUser.run(&ctx).unwrap(), TaskResult::Unchanged);
        assert_eq!(executor.call_count(), 2);
    }

    #[test]
    fn create_user_uses_sudo_with_become() {
        let executor = mock(vec![(false, ""), (false, "")]);
        let (ctx, _log) = ContextBuilder::new()
            .executor(Arc::clone(&executor) as Arc<dyn Executor>)
            .become_root()
            .build();
        CreateUser.run(&ctx).unwrap();
        assert_eq!(
            executor.calls()[2],
            "sudo -n -- useradd -m -s /bin/bash -g root alice"
        );
    }

    #[test]
    fn create_user_rejects_unsafe_name() {
        let executor = mock(vec![]);
        let (ctx, _log) = ContextBuilder::new()
            .vars(|v| v.user_name = "../root".to_string())
            .executor(Arc::clone(&executor) as Arc<dyn Executor>)
            .build();
        let err = CreateUser.run(&ctx).unwrap_err();
        assert!(err.to_string().contains("user_name"), "{err}");
        assert_eq!(executor.call_count(), 0);
    }

    #[test]
    fn authorize_fails_on_empty_key_without_touching_host() {
        let executor = mock(vec![]);
        let (ctx, _log) = ContextBuilder::new()
            .executor(Arc::clone(&executor) as Arc<dyn Executor>)
            .build();
        let err = AuthorizeSshKey.run(&ctx).unwrap_err();
        assert!(err.to_string().contains("ssh_public_key"), "{err}");
        assert_eq!(executor.call_count(), 0);
    }

    #[test]
    fn authorize_fails_on_malformed_key() {
        let (ctx, _log) = ContextBuilder::new()
            .vars(|v| v.ssh_public_key = "ssh-ed25519 not-base64!".to_string())
            .build();
        let err = AuthorizeSshKey.run(&ctx).unwrap_err();
        assert!(err.to_string().contains("ssh_public_key"), "{err}");
    }

    #[test]
    fn authorize_creates_ssh_dir_and_key_file() {
        let executor = mock(vec![
            (false, "stat: cannot statx '/home/alice/.ssh': No such file or directory"),
            (false, "stat: cannot statx '/home/alice/.ssh/authorized_keys': No such file or directory"),
            (true, ""),
            (false, "stat: No such file or directory"),
            (true, "/tmp/tmp.stage\n"),
        ]);
        let (ctx, _log) = ContextBuilder::new()
            .vars(|v| {
                v.ssh_public_key = KEY.to_string();
                v.user_home = Some("/home/alice".to_string());
            })
            .executor(Arc::clone(&executor) as Arc<dyn Executor>)
            .build();
        assert_eq!(AuthorizeSshKey.run(&ctx).unwrap(), TaskResult::Changed);

        let calls = executor.calls();
        assert!(calls.contains(&"install -d -m 700 -o alice -g root -- /home/alice/.ssh".to_string()));
        assert!(calls.contains(
            &"install -m 600 -o alice -g root /tmp/tmp.stage /home/alice/.ssh/authorized_keys"
                .to_string()
        ));
        assert_eq!(executor.inputs(), vec![format!("{KEY}\n").into_bytes()]);
    }

    #[test]
    fn grant_sudo_validates_with_visudo() {
        let executor = Arc::new(
            MockExecutor::with_responses(vec![
                (false, "stat: No such file or directory".to_string()),
                (true, "/tmp/tmp.sudo\n".to_string()),
            ])
            .with_fallback(true, "")
            .with_which(true),
        );
        let (ctx, _log) = ContextBuilder::new()
            .executor(Arc::clone(&executor) as Arc<dyn Executor>)
            .build();
        assert_eq!(GrantPasswordlessSudo.run(&ctx).unwrap(), TaskResult::Changed);

        let calls = executor.calls();
        assert!(calls.contains(
            &"install -m 440 -o root -g root /tmp/tmp.sudo /etc/sudoers.d/.alice.devenv".to_string()
        ));
        assert!(calls.contains(&"visudo -c -f /etc/sudoers.d/.alice.devenv".to_string()));
        assert!(calls.contains(&"mv -f -- /etc/sudoers.d/.alice.devenv /etc/sudoers.d/alice".to_string()));
        assert_eq!(
            executor.inputs(),
            vec![b"alice ALL=(ALL) NOPASSWD: ALL\n".to_vec()]
        );
    }

    #[test]
    fn grant_sudo_unchanged_when_entry_present() {
        let sum = format!("{}  /etc/sudoers.d/alice\n", sha256_hex(sudoers_entry("alice").as_bytes()));
        let executor = mock(vec![(true, "440 root root regular file\n"), (true, &sum)]);
        let (ctx, _log) = ContextBuilder::new()
            .executor(Arc::clone(&executor) as Arc<dyn Executor>)
            .build();
        assert_eq!(GrantPasswordlessSudo.run(&ctx).unwrap(), TaskResult::Unchanged);
    }

    #[test]
    fn grant_sudo_dry_run_changes_nothing() {
        let executor = mock(vec![(false, "stat: No such file or directory")]);
        let (ctx, _log) = ContextBuilder::new()
            .executor(Arc::clone(&executor) as Arc<dyn Executor>)
            .dry_run()
            .build();
        assert_eq!(GrantPasswordlessSudo.run(&ctx).unwrap(), TaskResult::DryRun);
        assert_eq!(executor.calls(), vec!["stat -c %a %U %G %F -- /etc/sudoers.d/alice"]);
    }
}

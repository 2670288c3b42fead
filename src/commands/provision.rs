//! Command: run the playbook against every host of the inventory.
use std::io::{BufRead as _, Write as _};
use std::os::unix::fs::DirBuilderExt as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use rayon::prelude::*;

use super::{CommandSetup, INTERRUPTED};
use crate::cli::{GlobalOpts, ProvisionOpts};
use crate::config::inventory::Host;
use crate::config::validation::check_user_name;
use crate::config::{Config, LoadOptions};
use crate::connection::{self, ConnectOpts};
use crate::error::ConnectionError;
use crate::logging::{self, BufferedLog, Log, Logger};
use crate::tasks::{self, Context, Task, TaskFilter};

/// Environment variable supplying the sudo password non-interactively.
pub const BECOME_PASS_ENV: &str = "DEVENV_BECOME_PASS";

/// How a run reaches and changes its hosts.
#[derive(Clone, Default)]
pub struct RunSettings {
    /// Report changes without applying them.
    pub dry_run: bool,
    /// SSH connection options.
    pub connect: ConnectOpts,
    /// Run privileged commands through sudo.
    pub elevate: bool,
    /// Password handed to sudo on stdin.
    pub become_password: Option<Arc<str>>,
    /// Hosts provisioned at the same time.
    pub forks: usize,
    /// Task selection from `--skip` / `--only`.
    pub filter: TaskFilter,
}

impl std::fmt::Debug for RunSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunSettings")
            .field("dry_run", &self.dry_run)
            .field("connect", &self.connect)
            .field("elevate", &self.elevate)
            .field("become_password", &self.become_password.as_ref().map(|_| "<redacted>"))
            .field("forks", &self.forks)
            .field("filter", &self.filter)
            .finish()
    }
}

impl RunSettings {
    /// Settings for `opts`, with `become_password` already obtained.
    #[must_use]
    pub fn from_opts(
        global: &GlobalOpts,
        opts: &ProvisionOpts,
        become_password: Option<Arc<str>>,
    ) -> Self {
        // Password prompts from ssh would interleave across hosts.
        let forks = if opts.ask_pass { 1 } else { opts.forks.max(1) };
        Self {
            dry_run: global.dry_run,
            connect: ConnectOpts {
                login_user: opts.login_user.clone(),
                ask_pass: opts.ask_pass,
                control_dir: None,
            },
            elevate: opts.elevate || opts.ask_become_pass,
            become_password,
            forks,
            filter: TaskFilter::new(&opts.skip, &opts.only),
        }
    }
}

/// Run the provision command.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded, `user_name` is
/// unusable, or any host was unreachable or had a failed task.
pub fn run(global: &GlobalOpts, opts: &ProvisionOpts, log: &Arc<Logger>) -> Result<()> {
    log.info(&format!("devenv {}", super::version()));
    let setup = CommandSetup::init(
        global,
        &LoadOptions {
            playbook: opts.playbook.as_deref(),
            inventory: opts.inventory.as_deref(),
            extra_vars: &opts.vars.extra_vars,
        },
        log,
    )?;
    check_user_name(&setup.config.vars.user_name)?;

    let elevate = opts.elevate || opts.ask_become_pass;
    let password = if elevate {
        become_password(opts.ask_become_pass)?
    } else {
        None
    };
    let mut settings = RunSettings::from_opts(global, opts, password);
    settings.connect.control_dir = ssh_control_dir();
    if settings.dry_run {
        log.info("dry run: no changes will be made");
    }

    provision_hosts(&Arc::new(setup.config), &settings, log, &INTERRUPTED)?;
    log.print_summary();

    let count = log.failure_count();
    if count > 0 {
        anyhow::bail!("{count} task(s) failed or host(s) unreachable");
    }
    Ok(())
}

/// Provision every host of `config.inventory`, recording results in `log`.
///
/// Hosts run in parallel, at most `settings.forks` at a time; each host's
/// output is buffered and printed as one block when it finishes. Failures
/// are recorded, not returned.
///
/// # Errors
///
/// Returns an error only if the worker pool cannot be created.
pub fn provision_hosts(
    config: &Arc<Config>,
    settings: &RunSettings,
    log: &Arc<Logger>,
    interrupted: &AtomicBool,
) -> Result<()> {
    let tasks = tasks::playbook_tasks(&config.playbook.roles);
    log.stage(&format!(
        "Provisioning {} host(s) with {} task(s)",
        config.inventory.hosts.len(),
        tasks.len()
    ));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.forks.max(1))
        .thread_name(|i| format!("devenv-host-{i}"))
        .build()?;
    pool.install(|| {
        config.inventory.hosts.par_iter().for_each(|host| {
            provision_host(host, config, settings, &tasks, log, interrupted);
        });
    });
    Ok(())
}

fn provision_host(
    host: &Host,
    config: &Arc<Config>,
    settings: &RunSettings,
    tasks: &[Box<dyn Task>],
    log: &Arc<Logger>,
    interrupted: &AtomicBool,
) {
    let buffered = Arc::new(BufferedLog::for_host(Arc::clone(log), &host.name));
    log.notify_host_start(&host.name);
    buffered.stage(&format!("[{}] connect", host.name));

    let executor = connection::connect(host, &settings.connect);
    let login_uid = match connection::probe(host, executor.as_ref()) {
        Ok(uid) => uid,
        Err(e) => {
            let reason = format!("{e:#}");
            buffered.error(&reason);
            buffered.record_unreachable(&reason);
            buffered.flush_and_complete();
            return;
        }
    };

    let ctx = Context::new(
        Arc::clone(config),
        host.clone(),
        Arc::clone(&buffered) as Arc<dyn Log>,
        settings.dry_run,
        executor,
    )
    .with_login_uid(login_uid);
    let ctx = if settings.elevate {
        ctx.with_become(settings.become_password.clone())
    } else {
        ctx
    };

    if !tasks::run_host(tasks, &ctx, &settings.filter, interrupted) {
        buffered.debug(&format!("{} stopped early", host.name));
    }
    buffered.flush_and_complete();
}

/// Private directory for shared SSH connection sockets; `None` disables
/// connection sharing.
fn ssh_control_dir() -> Option<PathBuf> {
    let dir = logging::cache_dir()?.join("ssh");
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(&dir)
        .ok()?;
    Some(dir)
}

/// Obtain the sudo password: prompt on the terminal when `ask`, otherwise
/// take it from [`BECOME_PASS_ENV`]; `None` means sudo must not prompt.
fn become_password(ask: bool) -> Result<Option<Arc<str>>> {
    if !ask {
        return Ok(std::env::var(BECOME_PASS_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .map(Arc::from));
    }

    let prompt_failed = |e: std::io::Error| ConnectionError::PasswordPrompt(e.to_string());
    let mut stderr = std::io::stderr();
    stderr.write_all(b"BECOME password: ").map_err(prompt_failed)?;
    stderr.flush().map_err(prompt_failed)?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(prompt_failed)?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        return Err(ConnectionError::PasswordPrompt("empty password".to_string()).into());
    }
    Ok(Some(Arc::from(password)))
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::config::inventory::Inventory;
    use crate::logging::TaskStatus;

    fn opts(args: &[&str]) -> ProvisionOpts {
        use clap::Parser as _;
        let cli = crate::cli::Cli::parse_from(
            std::iter::once("devenv")
                .chain(std::iter::once("provision"))
                .chain(args.iter().copied()),
        );
        let crate::cli::Command::Provision(opts) = cli.command else {
            panic!("expected provision command");
        };
        opts
    }

    #[test]
    fn ask_pass_forces_single_fork() {
        let settings = RunSettings::from_opts(&GlobalOpts::default(), &opts(&["-k", "-f", "8"]), None);
        assert_eq!(settings.forks, 1);
        let settings = RunSettings::from_opts(&GlobalOpts::default(), &opts(&["-f", "8"]), None);
        assert_eq!(settings.forks, 8);
    }

    #[test]
    fn debug_redacts_become_password() {
        let settings = RunSettings {
            become_password: Some(Arc::from("hunter2")),
            ..RunSettings::default()
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn ask_become_pass_implies_become() {
        let settings = RunSettings::from_opts(&GlobalOpts::default(), &opts(&["-K"]), None);
        assert!(settings.elevate);
        let settings = RunSettings::from_opts(&GlobalOpts::default(), &opts(&[]), None);
        assert!(!settings.elevate);
    }

    #[test]
    fn unreachable_host_is_recorded_and_others_run() {
        let config = Config {
            root: PathBuf::from("/nonexistent"),
            playbook: crate::config::playbook::Playbook {
                name: "test".to_string(),
                roles: vec!["packages".to_string()],
                vars: toml::Table::new(),
            },
            vars: crate::config::vars::Vars {
                user_name: "alice".to_string(),
                ..Default::default()
            },
            inventory: Inventory {
                hosts: vec![
                    Host {
                        name: "ghost".to_string(),
                        address: "ghost.invalid".to_string(),
                        port: None,
                        user: None,
                        transport: crate::config::inventory::Transport::Ssh,
                    },
                    Host::local("localhost"),
                ],
            },
            files: crate::config::files::Manifest::default(),
        };
        let log = Arc::new(Logger::new("test"));
        provision_hosts(
            &Arc::new(config),
            &RunSettings {
                forks: 2,
                ..RunSettings::default()
            },
            &log,
            &AtomicBool::new(false),
        )
        .unwrap();

        let recap = log.recap();
        let ghost = recap.iter().find(|r| r.host == "ghost").unwrap();
        assert!(ghost.unreachable);
        let local = recap.iter().find(|r| r.host == "localhost").unwrap();
        assert!(!local.unreachable);
        assert_eq!(local.skipped, 1);
        assert!(
            log.task_entries()
                .iter()
                .any(|e| e.name == "packages: install" && e.status == TaskStatus::Skipped)
        );
    }
}

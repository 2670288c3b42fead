//! Transports to target hosts and privilege escalation.
//!
//! Every host gets an [`Executor`]: the local [`SystemExecutor`] for
//! `localhost`, or an [`SshExecutor`] that runs each command through the
//! system `ssh` client. Steps that need root wrap that executor in
//! [`Elevated`], which prefixes `sudo`.
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use anyhow::Result;

use crate::config::inventory::{Host, Transport};
use crate::error::ConnectionError;
use crate::exec::{self, ExecResult, Executor, SystemExecutor};

/// Seconds OpenSSH waits for the TCP connection before giving up.
const CONNECT_TIMEOUT_SECS: u32 = 10;

/// Exit status reserved by OpenSSH for its own (connection) errors.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Seconds an idle shared SSH connection stays open.
const CONTROL_PERSIST_SECS: u32 = 60;

/// Quote `word` for a POSIX shell.
///
/// Words made only of characters that are never special to the shell are
/// returned unchanged; everything else is wrapped in single quotes.
///
/// # Examples
///
/// ```
/// use devenv_cli::connection::shell_quote;
///
/// assert_eq!(shell_quote("/home/alice/.bashrc"), "/home/alice/.bashrc");
/// assert_eq!(shell_quote("it's"), r"'it'\''s'");
/// assert_eq!(shell_quote(""), "''");
/// ```
#[must_use]
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Join a program and its arguments into a single shell command line.
#[must_use]
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Connection settings that apply to every SSH host of a run.
#[derive(Debug, Clone, Default)]
pub struct ConnectOpts {
    /// Login user when the inventory entry does not name one.
    pub login_user: Option<String>,
    /// Let OpenSSH prompt for a password instead of failing in batch mode.
    pub ask_pass: bool,
    /// Directory for shared-connection sockets. When set, every command to
    /// a host reuses one authenticated connection, so a password is asked
    /// for once per host.
    pub control_dir: Option<PathBuf>,
}

/// Runs commands on a remote host through the system `ssh` client.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    host: String,
    destination: String,
    port: Option<u16>,
    batch_mode: bool,
    control_dir: Option<PathBuf>,
}

impl SshExecutor {
    /// Create an executor for `host`, resolving the login user from the
    /// inventory entry first and `opts` second.
    #[must_use]
    pub fn new(host: &Host, opts: &ConnectOpts) -> Self {
        let destination = match host.user.as_ref().or(opts.login_user.as_ref()) {
            Some(user) => format!("{user}@{}", host.address),
            None => host.address.clone(),
        };
        Self {
            host: host.name.clone(),
            destination,
            port: host.port,
            batch_mode: !opts.ask_pass,
            control_dir: opts.control_dir.clone(),
        }
    }

    /// Arguments passed to `ssh` to run `program args…` on the host.
    #[must_use]
    pub fn ssh_args(&self, program: &str, args: &[&str]) -> Vec<String> {
        let mut argv = Vec::new();
        if self.batch_mode {
            argv.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
        }
        argv.extend([
            "-o".to_string(),
            format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}"),
        ]);
        if let Some(dir) = &self.control_dir {
            argv.extend([
                "-o".to_string(),
                "ControlMaster=auto".to_string(),
                "-o".to_string(),
                format!("ControlPath={}/%C", dir.display()),
                "-o".to_string(),
                format!("ControlPersist={CONTROL_PERSIST_SECS}"),
            ]);
        }
        if let Some(port) = self.port {
            argv.extend(["-p".to_string(), port.to_string()]);
        }
        argv.push("--".to_string());
        argv.push(self.destination.clone());
        argv.push(command_line(program, args));
        argv
    }
}

impl Executor for SshExecutor {
    fn execute(&self, program: &str, args: &[&str], input: Option<&[u8]>) -> Result<ExecResult> {
        let mut cmd = Command::new("ssh");
        cmd.args(self.ssh_args(program, args));
        let result = exec::spawn(cmd, &format!("{program} on {}", self.host), input)?;
        if result.code == Some(SSH_CONNECTION_FAILURE) {
            return Err(ConnectionError::Unreachable {
                host: self.host.clone(),
                reason: result.stderr.trim().to_string(),
            }
            .into());
        }
        Ok(result)
    }
}

/// Runs commands through `sudo` on top of another executor.
///
/// Program lookups go through `sudo` as well, so they search sudo's
/// `secure_path` rather than the login user's `PATH`.
#[derive(Debug, Clone)]
pub struct Elevated {
    inner: Arc<dyn Executor>,
    password: Option<Arc<str>>,
    run_as: Option<String>,
}

impl Elevated {
    /// Wrap `inner`; with a `password`, sudo reads it from stdin, otherwise
    /// sudo runs non-interactively and fails if it would prompt.
    #[must_use]
    pub fn new(inner: Arc<dyn Executor>, password: Option<Arc<str>>) -> Self {
        Self {
            inner,
            password,
            run_as: None,
        }
    }

    /// Same escalation, but run commands as `user` instead of root.
    #[must_use]
    pub fn as_user(&self, user: &str) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            password: self.password.clone(),
            run_as: Some(user.to_string()),
        }
    }

    /// Arguments passed to `sudo` to run `program args…`.
    #[must_use]
    pub fn sudo_args<'a>(&'a self, program: &'a str, args: &[&'a str]) -> Vec<&'a str> {
        let mut argv = if self.password.is_some() {
            vec!["-S", "-p", ""]
        } else {
            vec!["-n"]
        };
        if let Some(user) = &self.run_as {
            argv.extend(["-H", "-u", user.as_str()]);
        }
        argv.push("--");
        argv.push(program);
        argv.extend_from_slice(args);
        argv
    }
}

impl Executor for Elevated {
    fn execute(&self, program: &str, args: &[&str], input: Option<&[u8]>) -> Result<ExecResult> {
        let argv = self.sudo_args(program, args);
        match (&self.password, input) {
            (None, input) => self.inner.execute("sudo", &argv, input),
            (Some(password), None) => {
                let line = format!("{password}\n");
                self.inner.execute("sudo", &argv, Some(line.as_bytes()))
            }
            // sudo may skip the prompt (cached or NOPASSWD credentials), in
            // which case the password line would leak into the command.
            (Some(_), Some(_)) => anyhow::bail!(
                "refusing to stream stdin to '{program}' through password-authenticated sudo"
            ),
        }
    }
}

/// Build the executor for `host`.
#[must_use]
pub fn connect(host: &Host, opts: &ConnectOpts) -> Arc<dyn Executor> {
    match host.transport {
        Transport::Local => Arc::new(SystemExecutor),
        Transport::Ssh => Arc::new(SshExecutor::new(host, opts)),
    }
}

/// Check that `host` accepts commands and return the login user's uid.
///
/// # Errors
///
/// Returns [`ConnectionError::Unreachable`] if the transport fails or
/// `id -u` does not report a uid.
pub fn probe(host: &Host, executor: &dyn Executor) -> Result<u32> {
    let unreachable = |reason: String| {
        anyhow::Error::from(ConnectionError::Unreachable {
            host: host.name.clone(),
            reason,
        })
    };
    let result = executor.run_unchecked("id", &["-u"])?;
    if !result.success {
        return Err(unreachable(result.stderr.trim().to_string()));
    }
    let output = result.stdout.trim();
    output
        .parse()
        .map_err(|_| unreachable(format!("unexpected `id -u` output: {output}")))
}

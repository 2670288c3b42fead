//! Top-level subcommand handlers.
pub mod completions;
pub mod provision;
pub mod roles;
pub mod validate;
pub mod vars;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

use crate::cli::GlobalOpts;
use crate::config::validation::{self, ValidationWarning, is_repo_root};
use crate::config::{Config, LoadOptions};
use crate::logging::Logger;

/// Environment variable naming the repository root.
pub const ROOT_ENV: &str = "DEVENV_ROOT";

/// Set once Ctrl-C is received; hosts stop before their next task.
pub static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Version string, from the release pipeline or `git describe` when
/// available.
#[must_use]
pub fn version() -> &'static str {
    option_env!("DEVENV_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Install the Ctrl-C handler that sets [`INTERRUPTED`].
///
/// A second Ctrl-C is handled the same way; running commands are not
/// killed, so each host finishes its current task.
pub fn install_interrupt_handler() {
    let installed = ctrlc::set_handler(|| {
        if !INTERRUPTED.swap(true, Ordering::SeqCst) {
            tracing::warn!("interrupted; stopping after the current task on each host");
        }
    });
    if let Err(e) = installed {
        tracing::debug!("cannot install interrupt handler: {e}");
    }
}

/// Configuration loaded and checked the same way for every command.
#[derive(Debug)]
pub struct CommandSetup {
    /// Resolved configuration.
    pub config: Config,
    /// Findings reported while loading.
    pub warnings: Vec<ValidationWarning>,
}

impl CommandSetup {
    /// Resolve the root, load all configuration and run the validators,
    /// logging every finding as a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be determined or any
    /// configuration file fails to load.
    pub fn init(global: &GlobalOpts, opts: &LoadOptions<'_>, log: &Logger) -> Result<Self> {
        let root = resolve_root(global)?;
        log.debug(&format!("repository root: {}", root.display()));

        log.stage("Loading configuration");
        let config = Config::load(&root, opts)?;
        log.info(&format!(
            "playbook '{}': {} roles, {} hosts, {} files",
            config.playbook.name,
            config.playbook.roles.len(),
            config.inventory.hosts.len(),
            config.files.iter().count()
        ));

        let warnings = validation::validate_all(&config);
        if !warnings.is_empty() {
            log.warn(&format!(
                "found {} configuration warning(s):",
                warnings.len()
            ));
            for warning in &warnings {
                log.warn(&format!(
                    "  {} [{}]: {}",
                    warning.source, warning.item, warning.message
                ));
            }
        }

        Ok(Self { config, warnings })
    }
}

/// Resolve the repository root from `--root`, `DEVENV_ROOT`, the binary
/// location or the current directory, in that order.
///
/// # Errors
///
/// Returns an error if no candidate contains `conf/` and `files/`.
pub fn resolve_root(global: &GlobalOpts) -> Result<PathBuf> {
    if let Some(root) = &global.root {
        return Ok(root.clone());
    }

    if let Ok(root) = std::env::var(ROOT_ENV) {
        return Ok(PathBuf::from(root));
    }

    if let Ok(exe) = std::env::current_exe()
        && let Some(parent) = exe.parent()
    {
        let candidates = [
            parent.join("../.."), // target/release/ → repo root
            parent.join(".."),    // bin/ → repo root
        ];
        if let Some(root) = candidates.iter().find(|c| is_repo_root(c)) {
            return Ok(std::fs::canonicalize(root)?);
        }
    }

    let cwd = std::env::current_dir()?;
    root_from_dir(&cwd)
}

fn root_from_dir(dir: &Path) -> Result<PathBuf> {
    if is_repo_root(dir) {
        return Ok(dir.to_path_buf());
    }
    anyhow::bail!("cannot determine repository root; use --root or set {ROOT_ENV}");
}

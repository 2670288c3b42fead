//! Command: print the resolved variable set.
use std::io::Write as _;

use anyhow::Result;

use super::resolve_root;
use crate::cli::{GlobalOpts, VarsOpts};
use crate::config::{Config, LoadOptions};

/// Run the vars command, writing the variables as TOML to stdout.
///
/// # Errors
///
/// Returns an error if configuration fails to load or stdout is closed.
pub fn run(global: &GlobalOpts, opts: &VarsOpts) -> Result<()> {
    let rendered = render(global, opts)?;
    std::io::stdout().write_all(rendered.as_bytes())?;
    Ok(())
}

/// Resolved variables as a TOML document.
///
/// # Errors
///
/// Returns an error if configuration fails to load.
pub fn render(global: &GlobalOpts, opts: &VarsOpts) -> Result<String> {
    let root = resolve_root(global)?;
    let config = Config::load(
        &root,
        &LoadOptions {
            playbook: opts.playbook.as_deref(),
            inventory: None,
            extra_vars: &opts.vars.extra_vars,
        },
    )?;
    Ok(config.vars.to_toml()?)
}

//! Command: check configuration without touching any host.
use anyhow::Result;

use super::CommandSetup;
use crate::cli::GlobalOpts;
use crate::config::LoadOptions;
use crate::logging::Logger;

/// Run the validate command.
///
/// # Errors
///
/// Returns an error if configuration fails to load or any validator
/// reports a finding.
pub fn run(global: &GlobalOpts, log: &Logger) -> Result<()> {
    let setup = CommandSetup::init(global, &LoadOptions::default(), log)?;
    let count = setup.warnings.len();
    if count > 0 {
        anyhow::bail!("{count} validation finding(s)");
    }
    log.info("configuration is valid");
    Ok(())
}

//! Command: list roles and the tasks they run.
use std::fmt::Write as _;
use std::io::Write as _;

use anyhow::Result;

use crate::config::playbook::KNOWN_ROLES;
use crate::tasks;

/// Run the roles command.
///
/// # Errors
///
/// Returns an error if stdout is closed.
pub fn run() -> Result<()> {
    std::io::stdout().write_all(describe().as_bytes())?;
    Ok(())
}

/// Every role followed by its tasks in execution order.
#[must_use]
pub fn describe() -> String {
    let mut out = String::new();
    for role in KNOWN_ROLES {
        let _ = writeln!(out, "{role}");
        for task in tasks::role_tasks(role) {
            let _ = writeln!(out, "  - {}", task.name());
        }
    }
    out
}

//! OS user account resource.
use anyhow::Result;

use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::exec::Executor;

/// A `passwd` database entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    /// Login name.
    pub name: String,
    /// Home directory.
    pub home: String,
    /// Login shell.
    pub shell: String,
}

impl PasswdEntry {
    /// Parse one `getent passwd` line (`name:x:uid:gid:gecos:home:shell`).
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.trim_end().split(':').collect();
        if fields.len() != 7 {
            return None;
        }
        Some(Self {
            name: (*fields.first()?).to_string(),
            home: (*fields.get(5)?).to_string(),
            shell: (*fields.get(6)?).to_string(),
        })
    }
}

/// Look up `name` in the target's user database.
///
/// # Errors
///
/// Returns an error if `getent` cannot be executed.
pub fn lookup(executor: &dyn Executor, name: &str) -> Result<Option<PasswdEntry>> {
    let result = executor.run_unchecked("getent", &["passwd", name])?;
    if !result.success {
        return Ok(None);
    }
    Ok(result.stdout.lines().next().and_then(PasswdEntry::parse))
}

/// An OS user account with a login shell, primary group and supplementary
/// groups.
///
/// Supplementary groups are added, never removed: groups granted outside
/// this tool are preserved.
#[derive(Debug)]
pub struct UserAccountResource<'a> {
    /// Login name.
    pub name: String,
    /// Login shell.
    pub shell: String,
    /// Primary group.
    pub group: String,
    /// Supplementary groups.
    pub groups: Vec<String>,
    executor: &'a dyn Executor,
}

impl<'a> UserAccountResource<'a> {
    /// Create a new account resource; `executor` must be able to run
    /// `useradd`/`usermod`.
    #[must_use]
    pub const fn new(
        name: String,
        shell: String,
        group: String,
        groups: Vec<String>,
        executor: &'a dyn Executor,
    ) -> Self {
        Self {
            name,
            shell,
            group,
            groups,
            executor,
        }
    }

    fn drift(&self, entry: &PasswdEntry) -> Result<Vec<String>> {
        let mut drift = Vec::new();
        if entry.shell != self.shell {
            drift.push(format!("shell {}", entry.shell));
        }

        let primary = self.executor.run("id", &["-gn", &self.name])?;
        let primary = primary.stdout.trim();
        if primary != self.group {
            drift.push(format!("group {primary}"));
        }

        if !self.groups.is_empty() {
            let all = self.executor.run("id", &["-Gn", &self.name])?;
            let current: Vec<&str> = all.stdout.split_whitespace().collect();
            let missing: Vec<&str> = self
                .groups
                .iter()
                .map(String::as_str)
                .filter(|g| !current.contains(g))
                .collect();
            if !missing.is_empty() {
                drift.push(format!("not in {}", missing.join(",")));
            }
        }
        Ok(drift)
    }
}

impl Applicable for UserAccountResource<'_> {
    fn description(&self) -> String {
        format!("user {}", self.name)
    }

    fn apply(&self) -> Result<ResourceChange> {
        let groups = self.groups.join(",");
        let exists = lookup(self.executor, &self.name)?.is_some();

        let mut args = if exists {
            vec!["-s", self.shell.as_str(), "-g", self.group.as_str()]
        } else {
            vec!["-m", "-s", self.shell.as_str(), "-g", self.group.as_str()]
        };
        if !groups.is_empty() {
            if exists {
                args.push("-a");
            }
            args.extend(["-G", groups.as_str()]);
        }
        args.push(self.name.as_str());

        let program = if exists { "usermod" } else { "useradd" };
        self.executor.run(program, &args)?;
        Ok(ResourceChange::Applied)
    }
}

impl Resource for UserAccountResource<'_> {
    fn current_state(&self) -> Result<ResourceState> {
        let Some(entry) = lookup(self.executor, &self.name)? else {
            return Ok(ResourceState::Missing);
        };
        let drift = self.drift(&entry)?;
        if drift.is_empty() {
            Ok(ResourceState::Correct)
        } else {
            Ok(ResourceState::Incorrect {
                current: drift.join(", "),
            })
        }
    }
}

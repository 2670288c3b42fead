//! OS package resource.
use std::collections::HashSet;

use anyhow::Result;

use super::ResourceState;
use crate::exec::Executor;

/// Supported package managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    /// Debian and Ubuntu (apt-get / dpkg).
    Apt,
    /// Fedora and RHEL (dnf / rpm).
    Dnf,
    /// Arch Linux (pacman).
    Pacman,
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Apt => write!(f, "apt"),
            Self::Dnf => write!(f, "dnf"),
            Self::Pacman => write!(f, "pacman"),
        }
    }
}

impl PackageManager {
    /// Detect the package manager available on the target.
    #[must_use]
    pub fn detect(executor: &dyn Executor) -> Option<Self> {
        [
            ("apt-get", Self::Apt),
            ("dnf", Self::Dnf),
            ("pacman", Self::Pacman),
        ]
        .into_iter()
        .find(|(program, _)| executor.which(program))
        .map(|(_, manager)| manager)
    }

    /// Run the install command for `names` in one invocation.
    fn install(self, executor: &dyn Executor, names: &[&str]) -> Result<()> {
        match self {
            Self::Apt => {
                executor.run("apt-get", &["update", "-qq"])?;
                let mut args = vec![
                    "DEBIAN_FRONTEND=noninteractive",
                    "apt-get",
                    "install",
                    "-y",
                    "-qq",
                ];
                args.extend_from_slice(names);
                executor.run("env", &args)?;
            }
            Self::Dnf => {
                let mut args = vec!["install", "-y", "-q"];
                args.extend_from_slice(names);
                executor.run("dnf", &args)?;
            }
            Self::Pacman => {
                let mut args = vec!["-S", "--needed", "--noconfirm"];
                args.extend_from_slice(names);
                executor.run("pacman", &args)?;
            }
        }
        Ok(())
    }
}

/// A system package checked against a bulk query and installed in a batch.
#[derive(Debug)]
pub struct PackageResource<'a> {
    /// Package name.
    pub name: String,
    /// Package manager to use.
    pub manager: PackageManager,
    /// Executor for package manager commands (privileged for installs).
    executor: &'a dyn Executor,
}

impl<'a> PackageResource<'a> {
    /// Create a new package resource.
    #[must_use]
    pub const fn new(name: String, manager: PackageManager, executor: &'a dyn Executor) -> Self {
        Self {
            name,
            manager,
            executor,
        }
    }

    /// Human-readable description, e.g. `git (apt)`.
    #[must_use]
    pub fn description(&self) -> String {
        format!("{} ({})", self.name, self.manager)
    }

    /// Determine the resource state from a pre-fetched set of installed package names.
    ///
    /// This avoids running a per-package query when used with
    /// [`get_installed_packages`].
    #[must_use]
    pub fn state_from_installed(&self, installed: &HashSet<String>) -> ResourceState {
        if installed.contains(&self.name) {
            ResourceState::Correct
        } else {
            ResourceState::Missing
        }
    }
}

/// Query the full set of installed package names for a given manager.
///
/// This runs a **single** command regardless of how many packages need to
/// be checked.
///
/// # Errors
///
/// Returns an error if the query cannot be executed or exits non-zero; an
/// empty set would make every package look missing.
pub fn get_installed_packages(
    manager: PackageManager,
    executor: &dyn Executor,
) -> Result<HashSet<String>> {
    let result = match manager {
        PackageManager::Apt => {
            executor.run("dpkg-query", &["-W", "-f", "${Package} ${Status}\\n"])?
        }
        PackageManager::Dnf => executor.run("rpm", &["-qa", "--qf", "%{NAME}\\n"])?,
        PackageManager::Pacman => executor.run("pacman", &["-Qq"])?,
    };

    let mut set = HashSet::new();
    for line in result.stdout.lines() {
        let mut fields = line.split_whitespace();
        let Some(name) = fields.next() else {
            continue;
        };
        // dpkg keeps removed-but-configured packages in its database.
        if manager == PackageManager::Apt && !line.ends_with("install ok installed") {
            continue;
        }
        set.insert(name.to_string());
    }
    Ok(set)
}

/// Install a batch of packages in a single command per package manager.
///
/// Groups the given resources by their [`PackageManager`] and runs one
/// installation command per group, using the first resource's executor.
///
/// # Errors
///
/// Returns an error if any package manager command fails.
pub fn batch_install_packages(resources: &[&PackageResource<'_>]) -> Result<()> {
    for manager in [
        PackageManager::Apt,
        PackageManager::Dnf,
        PackageManager::Pacman,
    ] {
        let group: Vec<&&PackageResource<'_>> =
            resources.iter().filter(|r| r.manager == manager).collect();
        let Some(first) = group.first() else {
            continue;
        };
        let names: Vec<&str> = group.iter().map(|r| r.name.as_str()).collect();
        manager.install(first.executor, &names)?;
    }
    Ok(())
}

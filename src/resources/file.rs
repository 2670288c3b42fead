//! Managed file and directory resources.
//!
//! Content is compared by SHA-256: the desired bytes are hashed locally and
//! `sha256sum` runs on the target, so unchanged files cost one round trip
//! and are never rewritten.
//!
//! Writes go through a staging file created with `mktemp` by the
//! unprivileged *stager* and are then moved into place with `install`,
//! which sets mode and ownership in the same step. Content never travels
//! through `sudo`'s stdin, which is reserved for the become password.
use anyhow::Result;
use sha2::{Digest as _, Sha256};

use super::error::ResourceError;
use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::exec::Executor;

/// Attributes reported by `stat` for an existing path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatInfo {
    /// Octal permission bits as printed by `stat` (`644`, `4755`).
    pub mode: String,
    /// Owning user name.
    pub owner: String,
    /// Owning group name.
    pub group: String,
    /// File type (`regular file`, `directory`, ...).
    pub kind: String,
}

impl StatInfo {
    /// Whether the path is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == "directory"
    }
}

/// Stat `path` on the target, `None` when it does not exist.
///
/// # Errors
///
/// Returns an error if `stat` fails for any reason other than a missing
/// path (typically insufficient privilege).
pub fn stat(executor: &dyn Executor, path: &str) -> Result<Option<StatInfo>> {
    let result = executor.run_unchecked("stat", &["-c", "%a %U %G %F", "--", path])?;
    if !result.success {
        if result.stderr.contains("No such file or directory") {
            return Ok(None);
        }
        return Err(
            ResourceError::from_failure("stat", result.code.unwrap_or(-1), &result.stderr).into(),
        );
    }
    parse_stat(result.stdout.trim())
        .map(Some)
        .ok_or_else(|| {
            ResourceError::InvalidState {
                resource: path.to_string(),
                reason: format!("unexpected stat output: {}", result.stdout.trim()),
            }
            .into()
        })
}

fn parse_stat(line: &str) -> Option<StatInfo> {
    let mut parts = line.splitn(4, ' ');
    Some(StatInfo {
        mode: parts.next()?.to_string(),
        owner: parts.next()?.to_string(),
        group: parts.next()?.to_string(),
        kind: parts.next()?.to_string(),
    })
}

/// Describe ownership differences, `None` when `stat` matches.
fn ownership_drift(info: &StatInfo, owner: Option<&str>, group: Option<&str>) -> Option<String> {
    let owner_ok = owner.is_none_or(|o| o == info.owner);
    let group_ok = group.is_none_or(|g| g == info.group);
    (!owner_ok || !group_ok).then(|| format!("owner {}:{}", info.owner, info.group))
}

fn ownership_args<'a>(owner: Option<&'a str>, group: Option<&'a str>) -> Vec<&'a str> {
    let mut args = Vec::new();
    if let Some(owner) = owner {
        args.extend(["-o", owner]);
    }
    if let Some(group) = group {
        args.extend(["-g", group]);
    }
    args
}

/// Lowercase hex SHA-256 of `content`.
#[must_use]
pub fn sha256_hex(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// A file whose content, mode and ownership are fully managed.
///
/// Applying overwrites whatever is at the path; there is no merge.
#[derive(Debug)]
pub struct ManagedFileResource<'a> {
    /// Absolute path on the target.
    pub path: String,
    content: Vec<u8>,
    /// Permission bits.
    pub mode: u32,
    owner: Option<String>,
    group: Option<String>,
    executor: &'a dyn Executor,
    stager: &'a dyn Executor,
    validate_sudoers: bool,
}

impl<'a> ManagedFileResource<'a> {
    /// Manage `path` through `executor`, staging with the same executor.
    #[must_use]
    pub fn new(path: String, content: Vec<u8>, mode: u32, executor: &'a dyn Executor) -> Self {
        Self {
            path,
            content,
            mode,
            owner: None,
            group: None,
            executor,
            stager: executor,
            validate_sudoers: false,
        }
    }

    /// Require the file to be owned by `owner` and `group`.
    #[must_use]
    pub fn owned_by(mut self, owner: Option<&str>, group: Option<&str>) -> Self {
        self.owner = owner.map(String::from);
        self.group = group.map(String::from);
        self
    }

    /// Create the staging file through `stager` instead of the main executor.
    #[must_use]
    pub fn staged_with(mut self, stager: &'a dyn Executor) -> Self {
        self.stager = stager;
        self
    }

    /// Check the content with `visudo -cf` before it replaces the file.
    #[must_use]
    pub const fn validated_by_visudo(mut self) -> Self {
        self.validate_sudoers = true;
        self
    }

    fn mode_string(&self) -> String {
        format!("{:o}", self.mode)
    }

    fn write(&self, staged: &str) -> Result<()> {
        self.stager
            .run_with_input("sh", &["-c", "cat > \"$1\"", "sh", staged], &self.content)?;

        let mode = self.mode_string();
        let mut args = vec!["-m", mode.as_str()];
        args.extend(ownership_args(self.owner.as_deref(), self.group.as_deref()));

        if !self.validate_sudoers {
            args.extend([staged, self.path.as_str()]);
            self.executor.run("install", &args)?;
            return Ok(());
        }

        // Candidate sits next to the destination with its final attributes;
        // a leading dot keeps sudo's includedir from reading it.
        let candidate = sibling_candidate(&self.path);
        args.extend([staged, candidate.as_str()]);
        self.executor.run("install", &args)?;
        let checked = self.executor.run_unchecked("visudo", &["-c", "-f", &candidate])?;
        if !checked.success {
            self.executor.run_unchecked("rm", &["-f", "--", &candidate])?;
            return Err(ResourceError::InvalidState {
                resource: self.path.clone(),
                reason: format!(
                    "rejected by visudo: {}",
                    [checked.stdout.trim(), checked.stderr.trim()].join(" ").trim()
                ),
            }
            .into());
        }
        self.executor.run("mv", &["-f", "--", &candidate, &self.path])?;
        Ok(())
    }
}

/// `dir/.name.devenv` for `dir/name`.
fn sibling_candidate(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/.{name}.devenv"),
        None => format!(".{path}.devenv"),
    }
}

impl Applicable for ManagedFileResource<'_> {
    fn description(&self) -> String {
        self.path.clone()
    }

    fn apply(&self) -> Result<ResourceChange> {
        let staged = self.stager.run("mktemp", &[])?.stdout.trim().to_string();
        let written = self.write(&staged);
        // install copies; the stage file is removed either way.
        self.stager.run_unchecked("rm", &["-f", "--", &staged])?;
        written?;
        Ok(ResourceChange::Applied)
    }
}

impl Resource for ManagedFileResource<'_> {
    fn current_state(&self) -> Result<ResourceState> {
        let Some(info) = stat(self.executor, &self.path)? else {
            return Ok(ResourceState::Missing);
        };
        if info.is_dir() {
            return Ok(ResourceState::Invalid {
                reason: format!("{} is a directory", self.path),
            });
        }

        let sum = self.executor.run("sha256sum", &["--", &self.path])?;
        let current = sum.stdout.split_whitespace().next().unwrap_or_default();
        if current != sha256_hex(&self.content) {
            return Ok(ResourceState::Incorrect {
                current: "content differs".to_string(),
            });
        }
        if info.mode != self.mode_string() {
            return Ok(ResourceState::Incorrect {
                current: format!("mode {}", info.mode),
            });
        }
        if let Some(current) = ownership_drift(&info, self.owner.as_deref(), self.group.as_deref())
        {
            return Ok(ResourceState::Incorrect { current });
        }
        Ok(ResourceState::Correct)
    }
}

/// A directory that must exist with a given mode and ownership.
#[derive(Debug)]
pub struct ManagedDirResource<'a> {
    /// Absolute path on the target.
    pub path: String,
    /// Permission bits applied when the directory is created (or always,
    /// when strict).
    pub mode: u32,
    owner: Option<String>,
    group: Option<String>,
    strict: bool,
    executor: &'a dyn Executor,
}

impl<'a> ManagedDirResource<'a> {
    /// Ensure `path` exists; an existing directory is left as it is.
    #[must_use]
    pub const fn new(path: String, mode: u32, executor: &'a dyn Executor) -> Self {
        Self {
            path,
            mode,
            owner: None,
            group: None,
            strict: false,
            executor,
        }
    }

    /// Owner and group for the directory.
    #[must_use]
    pub fn owned_by(mut self, owner: Option<&str>, group: Option<&str>) -> Self {
        self.owner = owner.map(String::from);
        self.group = group.map(String::from);
        self
    }

    /// Also correct mode and ownership of an existing directory.
    #[must_use]
    pub const fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

impl Applicable for ManagedDirResource<'_> {
    fn description(&self) -> String {
        format!("{}/", self.path.trim_end_matches('/'))
    }

    fn apply(&self) -> Result<ResourceChange> {
        let mode = format!("{:o}", self.mode);
        let mut args = vec!["-d", "-m", mode.as_str()];
        args.extend(ownership_args(self.owner.as_deref(), self.group.as_deref()));
        args.extend(["--", self.path.as_str()]);
        self.executor.run("install", &args)?;
        Ok(ResourceChange::Applied)
    }
}

impl Resource for ManagedDirResource<'_> {
    fn current_state(&self) -> Result<ResourceState> {
        let Some(info) = stat(self.executor, &self.path)? else {
            return Ok(ResourceState::Missing);
        };
        if !info.is_dir() {
            return Ok(ResourceState::Invalid {
                reason: format!("{} exists and is not a directory", self.path),
            });
        }
        if !self.strict {
            return Ok(ResourceState::Correct);
        }
        if info.mode != format!("{:o}", self.mode) {
            return Ok(ResourceState::Incorrect {
                current: format!("mode {}", info.mode),
            });
        }
        Ok(
            ownership_drift(&info, self.owner.as_deref(), self.group.as_deref())
                .map_or(ResourceState::Correct, |current| {
                    ResourceState::Incorrect { current }
                }),
        )
    }
}

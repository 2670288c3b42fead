//! `authorized_keys` entry resource.
use anyhow::Result;

use super::error::ResourceError;
use super::file::{ManagedFileResource, stat};
use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::config::validation::SshPublicKey;
use crate::exec::Executor;

/// Mode enforced on `authorized_keys`.
pub const AUTHORIZED_KEYS_MODE: u32 = 0o600;

/// Ensures one public key is present in a user's `authorized_keys`.
///
/// Existing lines are kept; the key is appended when no line carries the
/// same type and key data. Mode and ownership are enforced on every apply.
#[derive(Debug)]
pub struct AuthorizedKeyResource<'a> {
    /// Absolute path of the `authorized_keys` file.
    pub path: String,
    key: SshPublicKey,
    owner: String,
    group: String,
    executor: &'a dyn Executor,
    stager: &'a dyn Executor,
}

impl<'a> AuthorizedKeyResource<'a> {
    /// Manage `key` in the file at `path`, owned by `owner:group`.
    #[must_use]
    pub fn new(
        path: String,
        key: SshPublicKey,
        owner: &str,
        group: &str,
        executor: &'a dyn Executor,
    ) -> Self {
        Self {
            path,
            key,
            owner: owner.to_string(),
            group: group.to_string(),
            executor,
            stager: executor,
        }
    }

    /// Stage writes through `stager` (the unprivileged login executor).
    #[must_use]
    pub fn staged_with(mut self, stager: &'a dyn Executor) -> Self {
        self.stager = stager;
        self
    }

    fn read_existing(&self) -> Result<Option<String>> {
        if stat(self.executor, &self.path)?.is_none() {
            return Ok(None);
        }
        Ok(Some(self.executor.run("cat", &["--", &self.path])?.stdout))
    }

    fn desired_content(&self, existing: Option<&str>) -> String {
        let mut content = existing.unwrap_or_default().to_string();
        if content.lines().any(|l| self.key.matches_line(l)) {
            return content;
        }
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&self.key.to_string());
        content.push('\n');
        content
    }

    fn file(&self, content: String) -> ManagedFileResource<'a> {
        ManagedFileResource::new(
            self.path.clone(),
            content.into_bytes(),
            AUTHORIZED_KEYS_MODE,
            self.executor,
        )
        .owned_by(Some(self.owner.as_str()), Some(self.group.as_str()))
        .staged_with(self.stager)
    }
}

impl Applicable for AuthorizedKeyResource<'_> {
    fn description(&self) -> String {
        format!("{} in {}", self.key.key_type, self.path)
    }

    fn apply(&self) -> Result<ResourceChange> {
        let existing = self.read_existing()?;
        self.file(self.desired_content(existing.as_deref())).apply()
    }
}

impl Resource for AuthorizedKeyResource<'_> {
    fn current_state(&self) -> Result<ResourceState> {
        let Some(existing) = self.read_existing()? else {
            return Ok(ResourceState::Missing);
        };
        if existing.contains('\0') {
            return Err(ResourceError::InvalidState {
                resource: self.path.clone(),
                reason: "file is not text".to_string(),
            }
            .into());
        }
        if !existing.lines().any(|l| self.key.matches_line(l)) {
            return Ok(ResourceState::Incorrect {
                current: "key not present".to_string(),
            });
        }
        // Key present: remaining drift is mode or ownership.
        self.file(existing).current_state()
    }
}

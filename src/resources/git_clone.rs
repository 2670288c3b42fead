//! Shallow git checkout resource.
use anyhow::Result;

use super::file::stat;
use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::exec::Executor;

/// A repository cloned once into a destination directory.
///
/// An existing checkout is left alone; updating plugins is the plugin
/// manager's job.
#[derive(Debug)]
pub struct GitCloneResource<'a> {
    /// Remote URL.
    pub url: String,
    /// Absolute destination path on the target.
    pub dest: String,
    executor: &'a dyn Executor,
}

impl<'a> GitCloneResource<'a> {
    /// Clone `url` into `dest` using `executor` (normally running as the
    /// owning user so the checkout belongs to them).
    #[must_use]
    pub const fn new(url: String, dest: String, executor: &'a dyn Executor) -> Self {
        Self {
            url,
            dest,
            executor,
        }
    }
}

impl Applicable for GitCloneResource<'_> {
    fn description(&self) -> String {
        format!("{} -> {}", self.url, self.dest)
    }

    fn apply(&self) -> Result<ResourceChange> {
        // The cloning user may not be able to read the login user's cwd.
        let parent = match self.dest.rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => dir,
            _ => "/",
        };
        self.executor.run(
            "git",
            &[
                "-C", parent, "clone", "--quiet", "--depth", "1", "--", &self.url, &self.dest,
            ],
        )?;
        Ok(ResourceChange::Applied)
    }
}

impl Resource for GitCloneResource<'_> {
    fn current_state(&self) -> Result<ResourceState> {
        if stat(self.executor, &format!("{}/.git", self.dest))?.is_some() {
            return Ok(ResourceState::Correct);
        }
        match stat(self.executor, &self.dest)? {
            None => Ok(ResourceState::Missing),
            Some(_) => Ok(ResourceState::Invalid {
                reason: format!("{} exists and is not a git checkout", self.dest),
            }),
        }
    }
}

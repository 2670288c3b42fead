//! Configuration file deployment for the `bash`, `tmux` and `neovim` roles.
use std::path::Path;

use anyhow::{Context as _, Result};

use super::{Context, ProcessOpts, Task, TaskResult, TaskStats, process_single};
use crate::resources::Resource as _;
use crate::resources::file::{ManagedDirResource, ManagedFileResource};

/// Mode of directories created on the way to a deployed file.
const DIR_MODE: u32 = 0o755;

/// Copy every manifest entry of a role into the user's home directory.
///
/// Targets are overwritten with the repository copy; missing parent
/// directories are created first.
#[derive(Debug)]
pub struct DeployFiles {
    role: &'static str,
    name: String,
}

impl DeployFiles {
    /// Deployment task for `role`'s section of `conf/files.toml`.
    #[must_use]
    pub fn new(role: &'static str) -> Self {
        Self {
            role,
            name: format!("{role}: deploy config"),
        }
    }
}

impl Task for DeployFiles {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> &str {
        self.role
    }

    fn should_run(&self, ctx: &Context) -> bool {
        !ctx.config.files.for_role(self.role).is_empty()
    }

    fn skip_reason(&self) -> &str {
        "no files listed for this role"
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let home = ctx.user_home()?;
        let home = home.trim_end_matches('/');
        let (owner, group) = ctx.home_ownership();
        let privileged = ctx.privileged();
        let opts = ProcessOpts::strict("deploy");
        let files_dir = ctx.config.files_dir();

        let mut stats = TaskStats::new();
        let mut seen_dirs: Vec<String> = Vec::new();
        for entry in ctx.config.files.for_role(self.role) {
            let source = files_dir.join(&entry.source);
            let content = std::fs::read(&source)
                .with_context(|| format!("reading {}", source.display()))?;

            for dir in parent_dirs(&entry.target) {
                let path = format!("{home}/{dir}");
                if seen_dirs.contains(&path) {
                    continue;
                }
                let resource =
                    ManagedDirResource::new(path.clone(), DIR_MODE, privileged).owned_by(owner, group);
                stats += process_single(ctx, &resource, resource.current_state()?, &opts)?;
                seen_dirs.push(path);
            }

            let file = ManagedFileResource::new(
                format!("{home}/{}", entry.target),
                content,
                entry.mode,
                privileged,
            )
            .owned_by(owner, group)
            .staged_with(ctx.executor.as_ref());
            stats += process_single(ctx, &file, file.current_state()?, &opts)?;
        }
        Ok(stats.finish(ctx))
    }
}

/// Directories between the home directory and `target`, outermost first.
fn parent_dirs(target: &str) -> Vec<String> {
    let mut dirs: Vec<String> = Path::new(target)
        .ancestors()
        .skip(1)
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    dirs.reverse();
    dirs
}

//! `tmux` role: the tmux plugin manager checkout.
use anyhow::Result;

use super::{Context, ProcessOpts, Task, TaskResult, TaskStats, process_single};
use crate::resources::Resource as _;
use crate::resources::file::ManagedDirResource;
use crate::resources::git_clone::GitCloneResource;

/// Checkout location of the plugin manager, relative to the home directory.
pub const TPM_DIR: &str = ".tmux/plugins/tpm";

/// Clone the tmux plugin manager that `tmux.conf` bootstraps from.
#[derive(Debug)]
pub struct InstallTmuxPluginManager;

impl Task for InstallTmuxPluginManager {
    fn name(&self) -> &'static str {
        "tmux: install plugin manager"
    }

    fn role(&self) -> &'static str {
        "tmux"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.vars().tmux_plugin_manager
    }

    fn skip_reason(&self) -> &'static str {
        "tmux_plugin_manager is false"
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let home = ctx.user_home()?;
        let home = home.trim_end_matches('/');
        let (owner, group) = ctx.home_ownership();
        let opts = ProcessOpts::strict("install");

        let mut stats = TaskStats::new();
        for dir in [".tmux", ".tmux/plugins"] {
            let dir = ManagedDirResource::new(format!("{home}/{dir}"), 0o755, ctx.privileged())
                .owned_by(owner, group);
            stats += process_single(ctx, &dir, dir.current_state()?, &opts)?;
        }

        let as_user = ctx.as_target_user();
        let checkout = GitCloneResource::new(
            ctx.vars().tmux_plugin_manager_url.clone(),
            format!("{home}/{TPM_DIR}"),
            as_user.as_ref(),
        );
        stats += process_single(ctx, &checkout, checkout.current_state()?, &opts)?;
        Ok(stats.finish(ctx))
    }
}

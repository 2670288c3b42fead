//! `packages` role: distribution packages through the detected manager.
use anyhow::Result;

use super::{Context, Task, TaskResult, TaskStats};
use crate::resources::error::ResourceError;
use crate::resources::package::{
    PackageManager, PackageResource, batch_install_packages, get_installed_packages,
};
use crate::resources::ResourceState;

/// Install the OS packages listed in `packages`.
///
/// Installed packages are queried once; everything missing goes to the
/// package manager in a single invocation.
#[derive(Debug)]
pub struct InstallPackages;

impl Task for InstallPackages {
    fn name(&self) -> &'static str {
        "packages: install"
    }

    fn role(&self) -> &'static str {
        "packages"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        !ctx.vars().packages.is_empty()
    }

    fn skip_reason(&self) -> &'static str {
        "no packages declared"
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let manager =
            PackageManager::detect(ctx.executor.as_ref()).ok_or_else(|| ResourceError::NotFound {
                resource: "package manager (apt-get, dnf or pacman)".to_string(),
            })?;
        ctx.log.debug(&format!("using {manager}"));

        let installed = get_installed_packages(manager, ctx.executor.as_ref())?;
        ctx.log.debug(&format!(
            "batch-checking {} packages against {} installed",
            ctx.vars().packages.len(),
            installed.len()
        ));

        let privileged = ctx.privileged();
        let resources: Vec<_> = ctx
            .vars()
            .packages
            .iter()
            .map(|name| PackageResource::new(name.clone(), manager, privileged))
            .collect();

        let mut stats = TaskStats::new();
        let mut missing = Vec::new();
        for resource in &resources {
            match resource.state_from_installed(&installed) {
                ResourceState::Correct => {
                    ctx.log.debug(&format!("ok: {}", resource.name));
                    stats.already_ok += 1;
                }
                _ if ctx.dry_run => {
                    ctx.log
                        .dry_run(&format!("would install: {}", resource.description()));
                    stats.changed += 1;
                }
                _ => missing.push(resource),
            }
        }

        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|r| r.name.as_str()).collect();
            ctx.log.info(&format!("installing {}", names.join(" ")));
            batch_install_packages(&missing)?;
            stats.changed += u32::try_from(missing.len()).unwrap_or(u32::MAX);
        }

        Ok(stats.finish(ctx))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::exec::Executor;
    use crate::resources::test_helpers::MockExecutor;
    use crate::tasks::test_helpers::ContextBuilder;
    use std::sync::Arc;

    const DPKG: &str = "git install ok installed\ntmux install ok installed\nvim deinstall ok config-files\n";

    fn build(executor: &Arc<MockExecutor>, packages: &[&str]) -> ContextBuilder {
        let packages: Vec<String> = packages.iter().map(ToString::to_string).collect();
        ContextBuilder::new()
            .vars(move |v| v.packages = packages)
            .executor(Arc::clone(executor) as Arc<dyn Executor>)
    }

    #[test]
    fn skipped_without_packages() {
        let (ctx, _log) = ContextBuilder::new().build();
        assert!(!InstallPackages.should_run(&ctx));
    }

    #[test]
    fn unchanged_when_all_installed() {
        let executor = Arc::new(MockExecutor::ok(DPKG).with_which(true));
        let (ctx, _log) = build(&executor, &["git", "tmux"]).build();
        assert_eq!(InstallPackages.run(&ctx).unwrap(), TaskResult::Unchanged);
        assert_eq!(executor.call_count(), 1);
    }

    #[test]
    fn missing_packages_installed_in_one_batch() {
        let executor = Arc::new(
            MockExecutor::ok(DPKG)
                .with_fallback(true, "")
                .with_which(true),
        );
        let (ctx, _log) = build(&executor, &["git", "vim", "neovim"]).build();
        assert_eq!(InstallPackages.run(&ctx).unwrap(), TaskResult::Changed);
        assert_eq!(
            executor.calls()[1..],
            [
                "apt-get update -qq",
                "env DEBIAN_FRONTEND=noninteractive apt-get install -y -qq vim neovim",
            ]
        );
    }

    #[test]
    fn install_goes_through_sudo_with_become() {
        let executor = Arc::new(
            MockExecutor::ok(DPKG)
                .with_fallback(true, "")
                .with_which(true),
        );
        let (ctx, _log) = build(&executor, &["neovim"]).become_root().build();
        InstallPackages.run(&ctx).unwrap();
        assert_eq!(executor.calls()[1], "sudo -n -- apt-get update -qq");
    }

    #[test]
    fn dry_run_installs_nothing() {
        let executor = Arc::new(MockExecutor::ok(DPKG).with_which(true));
        let (ctx, _log) = build(&executor, &["neovim"]).dry_run().build();
        assert_eq!(InstallPackages.run(&ctx).unwrap(), TaskResult::DryRun);
        assert_eq!(executor.call_count(), 1);
    }

    #[test]
    fn fails_without_package_manager() {
        let executor = Arc::new(MockExecutor::ok(""));
        let (ctx, _log) = build(&executor, &["git"]).build();
        let err = InstallPackages.run(&ctx).unwrap_err();
        assert!(err.to_string().contains("package manager"), "{err}");
    }

    #[test]
    fn failed_query_fails_task_instead_of_reinstalling() {
        let executor = Arc::new(
            MockExecutor::with_responses(vec![(false, "dpkg-query: error".to_string())])
                .with_fallback(true, "")
                .with_which(true),
        );
        let (ctx, _log) = build(&executor, &["git"]).build();
        assert!(InstallPackages.run(&ctx).is_err());
        assert_eq!(executor.call_count(), 1);
    }

    #[test]
    fn install_failure_fails_task() {
        let executor = Arc::new(
            MockExecutor::with_responses(vec![(true, DPKG.to_string()), (false, "E: no network".to_string())])
                .with_which(true),
        );
        let (ctx, _log) = build(&executor, &["neovim"]).build();
        assert!(InstallPackages.run(&ctx).is_err());
    }
}

//! Generic resource processing loop: check state, apply, collect stats.
use anyhow::Result;

use super::context::Context;
use crate::resources::error::ResourceError;
use crate::resources::{Resource, ResourceChange, ResourceState};

/// Result of a single task execution.
///
/// # Examples
///
/// ```
/// use devenv_cli::tasks::TaskResult;
///
/// let changed = TaskResult::Changed;
/// let skipped = TaskResult::Skipped("no packages declared".into());
///
/// assert!(matches!(changed, TaskResult::Changed));
/// assert!(matches!(skipped, TaskResult::Skipped(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    /// The task modified the host.
    Changed,
    /// The host was already in the desired state.
    Unchanged,
    /// The task had nothing to act on.
    Skipped(String),
    /// Dry run with pending changes.
    DryRun,
}

/// Counters for tasks that converge several resources.
///
/// # Examples
///
/// ```
/// use devenv_cli::tasks::TaskStats;
///
/// let stats = TaskStats { changed: 1, already_ok: 2, skipped: 0 };
/// assert_eq!(stats.summary(false), "1 changed, 2 already ok");
/// assert_eq!(stats.summary(true), "1 would change, 2 already ok");
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskStats {
    /// Number of items changed or applied.
    pub changed: u32,
    /// Number of items already in the correct state.
    pub already_ok: u32,
    /// Number of items skipped.
    pub skipped: u32,
}

impl TaskStats {
    /// Create a new empty stats counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Format the summary string (e.g. "3 changed, 10 already ok, 1 skipped").
    #[must_use]
    pub fn summary(&self, dry_run: bool) -> String {
        let verb = if dry_run { "would change" } else { "changed" };
        if self.skipped > 0 {
            format!(
                "{} {verb}, {} already ok, {} skipped",
                self.changed, self.already_ok, self.skipped
            )
        } else {
            format!("{} {verb}, {} already ok", self.changed, self.already_ok)
        }
    }

    /// Map the counters onto a [`TaskResult`] without logging.
    #[must_use]
    pub const fn result(&self, dry_run: bool) -> TaskResult {
        match (self.changed, dry_run) {
            (0, _) => TaskResult::Unchanged,
            (_, true) => TaskResult::DryRun,
            (_, false) => TaskResult::Changed,
        }
    }

    /// Log the summary and return the appropriate [`TaskResult`].
    #[must_use]
    pub fn finish(self, ctx: &Context) -> TaskResult {
        ctx.log.info(&self.summary(ctx.dry_run));
        self.result(ctx.dry_run)
    }
}

impl std::ops::AddAssign for TaskStats {
    fn add_assign(&mut self, other: Self) {
        self.changed += other.changed;
        self.already_ok += other.already_ok;
        self.skipped += other.skipped;
    }
}

/// How the processing loop reports each resource.
#[derive(Debug, Clone, Copy)]
pub struct ProcessOpts<'a> {
    /// Verb for log messages (e.g., "install", "deploy", "create").
    pub verb: &'a str,
}

impl<'a> ProcessOpts<'a> {
    /// Fix missing and incorrect resources, failing on anything else.
    #[must_use]
    pub const fn strict(verb: &'a str) -> Self {
        Self { verb }
    }
}

/// Process resources by checking each one's current state and applying as
/// needed, in order.
///
/// # Errors
///
/// Returns an error if a state check or an apply fails, or a resource is
/// `Invalid`.
pub fn process_resources<R: Resource>(
    ctx: &Context,
    resources: impl IntoIterator<Item = R>,
    opts: &ProcessOpts,
) -> Result<TaskResult> {
    let mut stats = TaskStats::new();
    for resource in resources {
        let current = resource.current_state()?;
        stats += process_single(ctx, &resource, current, opts)?;
    }
    Ok(stats.finish(ctx))
}

/// Process one resource given its current state, returning a stats delta.
///
/// # Errors
///
/// Returns an error if the resource is `Invalid` or fails to apply.
pub fn process_single<R: Resource>(
    ctx: &Context,
    resource: &R,
    current: ResourceState,
    opts: &ProcessOpts,
) -> Result<TaskStats> {
    let desc = resource.description();
    let mut delta = TaskStats::new();
    match current {
        ResourceState::Correct => {
            ctx.log.debug(&format!("ok: {desc}"));
            delta.already_ok += 1;
        }
        ResourceState::Invalid { reason } => {
            return Err(ResourceError::InvalidState {
                resource: desc,
                reason,
            }
            .into());
        }
        ResourceState::Missing | ResourceState::Incorrect { .. } if ctx.dry_run => {
            let msg = if let ResourceState::Incorrect { current } = &current {
                format!("would {} {desc} (currently {current})", opts.verb)
            } else {
                format!("would {}: {desc}", opts.verb)
            };
            ctx.log.dry_run(&msg);
            delta.changed += 1;
        }
        ResourceState::Missing | ResourceState::Incorrect { .. } => {
            delta += apply_resource(ctx, resource, opts)?;
        }
    }
    Ok(delta)
}

fn apply_resource<R: Resource>(ctx: &Context, resource: &R, opts: &ProcessOpts) -> Result<TaskStats> {
    let desc = resource.description();
    let mut delta = TaskStats::new();
    match resource.apply()? {
        ResourceChange::Applied => {
            ctx.log.info(&format!("{}: {desc}", opts.verb));
            delta.changed += 1;
        }
        ResourceChange::AlreadyCorrect => delta.already_ok += 1,
        ResourceChange::Skipped { reason } => {
            anyhow::bail!("failed to {} {desc}: {reason}", opts.verb);
        }
    }
    Ok(delta)
}

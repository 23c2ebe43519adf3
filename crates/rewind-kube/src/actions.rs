//! Options for the rollback operation

use chrono::Duration;

/// Default timeout for hooks and readiness waits (5 minutes)
pub const DEFAULT_TIMEOUT: Duration = Duration::minutes(5);

/// Options for rollback operation
#[derive(Debug, Clone, Default)]
pub struct RollbackOptions {
    /// Target revision (0 = previous)
    pub revision: i64,

    /// Timeout for hooks and waits
    pub timeout: Option<Duration>,

    /// Wait for resources to be ready
    pub wait: bool,

    /// Also wait for Jobs to complete (only with wait=true)
    pub wait_for_jobs: bool,

    /// Skip pre/post-rollback hooks
    pub disable_hooks: bool,

    /// Client-side dry run: resolve the target and stop
    pub dry_run: bool,

    /// Send every cluster request with server-side dry-run, persist nothing
    pub server_dry_run: bool,

    /// Recreate pods of updated workloads
    pub recreate: bool,

    /// Force resource updates through delete/recreate
    pub force: bool,

    /// Delete resources created by a failed rollback
    pub cleanup_on_fail: bool,

    /// Maximum history to keep (0 = unlimited)
    pub max_history: u32,
}

impl RollbackOptions {
    /// Create default rollback options (previous revision, no wait)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set target revision
    pub fn to_revision(mut self, revision: i64) -> Self {
        self.revision = revision;
        self
    }

    /// Wait for rollback
    pub fn with_wait(mut self, timeout: Duration) -> Self {
        self.wait = true;
        self.timeout = Some(timeout);
        self
    }

    /// Wait for Jobs too
    pub fn with_wait_for_jobs(mut self, timeout: Duration) -> Self {
        self.wait_for_jobs = true;
        self.with_wait(timeout)
    }

    /// Enable force mode
    pub fn with_force(mut self) -> Self {
        self.force = true;
        self
    }

    /// Skip hooks
    pub fn without_hooks(mut self) -> Self {
        self.disable_hooks = true;
        self
    }

    /// Enable client-side dry-run mode
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Enable server-side dry-run mode
    pub fn server_dry_run(mut self) -> Self {
        self.server_dry_run = true;
        self
    }

    /// Recreate pods of updated workloads
    pub fn with_recreate(mut self) -> Self {
        self.recreate = true;
        self
    }

    /// Delete created resources when the apply fails
    pub fn with_cleanup_on_fail(mut self) -> Self {
        self.cleanup_on_fail = true;
        self
    }

    /// Cap stored history
    pub fn with_max_history(mut self, max_history: u32) -> Self {
        self.max_history = max_history;
        self
    }

    /// Effective timeout for hooks and waits
    pub fn effective_timeout(&self) -> std::time::Duration {
        self.timeout
            .unwrap_or(DEFAULT_TIMEOUT)
            .to_std()
            .unwrap_or_default()
    }
}

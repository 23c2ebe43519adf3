//! Lifecycle hook execution
//!
//! Hooks travel with the release that owns them; an executor runs the ones
//! bound to a phase and reports the first failure.

use async_trait::async_trait;
use rewind_core::{Hook, HookCleanupPolicy, HookPhase, Release};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cluster::{ClusterClient, ObjectSet};
use crate::error::{KubeError, Result};

/// Runs the hooks of a release for one phase
#[async_trait]
pub trait HookExecutor: Send + Sync {
    /// Run every hook of `release` bound to `phase`, each bounded by `timeout`
    ///
    /// A hook that runs out of time fails as [`KubeError::HookFailed`].
    async fn exec(&self, release: &Release, phase: HookPhase, timeout: Duration) -> Result<()>;
}

/// Hooks of `release` bound to `phase`, ordered by weight then name
pub fn hooks_for_phase(release: &Release, phase: HookPhase) -> Vec<&Hook> {
    let mut hooks: Vec<&Hook> = release
        .hooks
        .iter()
        .filter(|h| h.runs_in_phase(phase))
        .collect();
    hooks.sort_by(|a, b| a.weight.cmp(&b.weight).then_with(|| a.name.cmp(&b.name)));
    hooks
}

/// Executes hooks by applying their manifests through a cluster client
pub struct ClusterHookExecutor {
    cluster: Arc<dyn ClusterClient>,
}

impl ClusterHookExecutor {
    pub fn new(cluster: Arc<dyn ClusterClient>) -> Self {
        Self { cluster }
    }

    async fn run_hook(
        &self,
        release: &Release,
        hook: &Hook,
        phase: HookPhase,
        timeout: Duration,
    ) -> Result<()> {
        let failed = |message: String| KubeError::HookFailed {
            name: release.name.clone(),
            revision: release.revision,
            hook_name: hook.name.clone(),
            phase,
            message,
        };

        let objects = self
            .cluster
            .build(&hook.manifest, &release.namespace)
            .map_err(|e| failed(e.to_string()))?;

        if hook.cleanup == HookCleanupPolicy::BeforeNextRun {
            let (_, errors) = self.cluster.delete(&objects).await;
            for e in errors {
                tracing::debug!(hook = %hook.name, "could not remove previous hook run: {}", e);
            }
        }

        self.cluster
            .update(&ObjectSet::new(), &objects, false)
            .await
            .map_err(|failure| failed(failure.error.to_string()))?;

        let outcome = match tokio::time::timeout(
            timeout,
            self.cluster.wait_with_jobs(&objects, timeout),
        )
        .await
        {
            Ok(result) => result.map_err(|e| failed(e.to_string())),
            Err(_) => Err(failed(format!("timed out after {:?}", timeout))),
        };

        let cleanup = match (hook.cleanup, outcome.is_ok()) {
            (HookCleanupPolicy::OnSuccess, true) | (HookCleanupPolicy::OnFailure, false) => true,
            _ => false,
        };
        if cleanup {
            let (_, errors) = self.cluster.delete(&objects).await;
            for e in errors {
                tracing::warn!(hook = %hook.name, "failed to clean up hook resources: {}", e);
            }
        }

        outcome
    }
}

#[async_trait]
impl HookExecutor for ClusterHookExecutor {
    async fn exec(&self, release: &Release, phase: HookPhase, timeout: Duration) -> Result<()> {
        let hooks = hooks_for_phase(release, phase);
        if hooks.is_empty() {
            return Ok(());
        }

        tracing::info!(release = %release.name, %phase, count = hooks.len(), "running hooks");
        for hook in hooks {
            tracing::debug!(hook = %hook.name, weight = hook.weight, "running hook");
            self.run_hook(release, hook, phase, timeout).await?;
        }
        Ok(())
    }
}

/// A recorded hook invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookCall {
    pub release: String,
    pub revision: u32,
    pub phase: HookPhase,
}

/// Hook executor that records invocations, for tests
#[derive(Clone, Default)]
pub struct MockHookExecutor {
    calls: Arc<Mutex<Vec<HookCall>>>,
    fail_phase: Option<HookPhase>,
}

impl MockHookExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every invocation of `phase`
    pub fn failing_on(phase: HookPhase) -> Self {
        Self {
            fail_phase: Some(phase),
            ..Self::default()
        }
    }

    /// Invocations so far, in order
    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Phases invoked so far, in order
    pub fn phases(&self) -> Vec<HookPhase> {
        self.calls().into_iter().map(|c| c.phase).collect()
    }
}

#[async_trait]
impl HookExecutor for MockHookExecutor {
    async fn exec(&self, release: &Release, phase: HookPhase, _timeout: Duration) -> Result<()> {
        self.calls.lock().unwrap().push(HookCall {
            release: release.name.clone(),
            revision: release.revision,
            phase,
        });

        if self.fail_phase == Some(phase) {
            return Err(KubeError::HookFailed {
                name: release.name.clone(),
                revision: release.revision,
                hook_name: format!("{}-{}", release.name, phase),
                phase,
                message: "job failed: BackoffLimitExceeded".to_string(),
            });
        }
        Ok(())
    }
}

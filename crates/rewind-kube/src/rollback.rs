//! The rollback engine
//!
//! A rollback restores the chart, values and manifest of an earlier revision
//! as a brand-new revision on top of the current one:
//!
//! 1. [`Rollback::resolve`] picks the current and designated revisions and
//!    drafts the new one (`pending-rollback`).
//! 2. [`Rollback::run`] checks the cluster, persists the draft and hands over
//!    to [`Rollback::execute`].
//! 3. `execute` builds both manifests, runs the `pre-rollback` hooks, applies
//!    the diff, optionally recreates pods and waits, runs the `post-rollback`
//!    hooks and supersedes every previously deployed revision.
//! 4. `run` persists the final `deployed` revision.
//!
//! Failures leave an audit trail: an apply failure marks the current revision
//! `superseded` and the new one `failed` (deleting what it created when asked
//! to), a readiness failure only marks the new revision `failed`.

use rewind_core::{HookPhase, Release, validate_release_name};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::actions::RollbackOptions;
use crate::cluster::{ApplyFailure, ClusterClient, ClusterResult};
use crate::error::{KubeError, ManifestSide, Result};
use crate::hooks::HookExecutor;
use crate::storage::{ReleaseStore, StorageDriver};

/// Time a readiness wait gets past its own deadline to report what is still pending
const WAIT_GRACE: Duration = Duration::from_secs(10);

/// Outcome of [`Rollback::run`]
#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    /// The new revision, `deployed` unless this was a client-side dry run
    pub release: Release,
    /// What changed in the cluster; `None` for a client-side dry run
    pub result: Option<ClusterResult>,
}

/// Successful outcome of [`Rollback::execute`]
#[derive(Debug, Clone)]
pub struct Executed {
    pub release: Release,
    pub result: ClusterResult,
}

/// Failed outcome of [`Rollback::execute`]
///
/// `release` is the new revision as last transitioned, which is what the
/// store holds unless this was a server dry run.
#[derive(Debug)]
pub struct RollbackFailure {
    pub release: Release,
    pub result: Option<ClusterResult>,
    pub error: KubeError,
}

impl RollbackFailure {
    fn new(release: Release, result: Option<ClusterResult>, error: KubeError) -> Self {
        Self {
            release,
            result,
            error,
        }
    }
}

impl From<RollbackFailure> for KubeError {
    fn from(failure: RollbackFailure) -> Self {
        failure.error
    }
}

/// Rolls a release back to an earlier revision
pub struct Rollback<S: StorageDriver> {
    store: ReleaseStore<S>,
    cluster: Arc<dyn ClusterClient>,
    hooks: Arc<dyn HookExecutor>,
    options: RollbackOptions,
}

impl<S: StorageDriver> Rollback<S> {
    pub fn new(
        store: ReleaseStore<S>,
        cluster: Arc<dyn ClusterClient>,
        hooks: Arc<dyn HookExecutor>,
        options: RollbackOptions,
    ) -> Self {
        Self {
            store,
            cluster,
            hooks,
            options,
        }
    }

    pub fn options(&self) -> &RollbackOptions {
        &self.options
    }

    pub fn store(&self) -> &ReleaseStore<S> {
        &self.store
    }

    /// Roll `name` back and persist the outcome
    ///
    /// With `server_dry_run`, the cluster client is replaced by its dry-run
    /// variant for the rest of this engine's life.
    pub async fn run(&mut self, name: &str) -> Result<RollbackReport> {
        validate(name, self.options.revision)?;

        if self.options.dry_run {
            let (_, draft) = self.resolve(name).await?;
            tracing::info!(release = name, revision = draft.revision, "dry run, nothing applied");
            return Ok(RollbackReport {
                release: draft,
                result: None,
            });
        }

        self.preflight().await?;
        self.store.set_max_history(self.options.max_history);

        tracing::info!(release = name, "preparing rollback");
        let (current, draft) = self.resolve(name).await?;

        let persist = !self.options.server_dry_run;
        if persist {
            tracing::debug!(release = name, revision = draft.revision, "creating rolled back release");
            self.store.create(&draft).await?;
        }

        tracing::info!(release = name, revision = draft.revision, "performing rollback");
        let executed = self.execute(current, draft).await?;

        if persist {
            tracing::debug!(release = name, "updating status of rolled back release");
            self.store.update(&executed.release).await?;
        }

        tracing::info!(
            release = name,
            revision = executed.release.revision,
            "rollback complete: {}",
            executed.result.summary()
        );
        Ok(RollbackReport {
            release: executed.release,
            result: Some(executed.result),
        })
    }

    /// Find the current revision and draft the one restoring the designated revision
    ///
    /// Reads only; nothing is persisted.
    pub async fn resolve(&self, name: &str) -> Result<(Release, Release)> {
        resolve_draft(&self.store, name, self.options.revision).await
    }

    /// Apply `draft` over `current` and settle both statuses
    ///
    /// Status writes on the failure paths happen here; the final write of the
    /// deployed revision is left to the caller.
    pub async fn execute(
        &self,
        current: Release,
        draft: Release,
    ) -> std::result::Result<Executed, RollbackFailure> {
        let opts = &self.options;
        let timeout = opts.effective_timeout();

        let current_objects = match self.cluster.build(&current.manifest, &current.namespace) {
            Ok(objects) => objects,
            Err(e) => return Err(build_failure(draft, ManifestSide::Current, e)),
        };
        let target_objects = match self.cluster.build(&draft.manifest, &draft.namespace) {
            Ok(objects) => objects,
            Err(e) => return Err(build_failure(draft, ManifestSide::Target, e)),
        };

        if !opts.server_dry_run {
            if opts.disable_hooks {
                tracing::debug!(release = %draft.name, "rollback hooks disabled");
            } else if let Err(e) = self
                .hooks
                .exec(&draft, HookPhase::PreRollback, timeout)
                .await
            {
                return Err(RollbackFailure::new(draft, None, e));
            }
        }

        let result = match self
            .cluster
            .update(&current_objects, &target_objects, opts.force)
            .await
        {
            Ok(result) => result,
            Err(failure) => return Err(self.apply_failed(current, draft, failure).await),
        };

        if opts.server_dry_run {
            return Ok(Executed {
                release: draft.deployed(),
                result,
            });
        }

        if opts.recreate {
            if let Err(e) = self.cluster.recreate_pods(&result.updated).await {
                tracing::warn!(release = %draft.name, "unable to recreate pods: {}", e);
            }
        }

        if opts.wait {
            let waited = if opts.wait_for_jobs {
                bounded_wait(timeout, self.cluster.wait_with_jobs(&target_objects, timeout)).await
            } else {
                bounded_wait(timeout, self.cluster.wait(&target_objects, timeout)).await
            };
            if let Err(e) = waited {
                let description = format!("Release \"{}\" failed: {}", draft.name, e);
                tracing::warn!("{}", description);
                let release = draft.failed(description);
                self.record(&release).await;
                let error = KubeError::WaitFailed {
                    name: release.name.clone(),
                    revision: release.revision,
                    source: Box::new(e),
                };
                return Err(RollbackFailure::new(release, Some(result), error));
            }
        }

        if !opts.disable_hooks {
            if let Err(e) = self.hooks.exec(&draft, HookPhase::PostRollback, timeout).await {
                return Err(RollbackFailure::new(draft, Some(result), e));
            }
        }

        let deployed = match self.store.deployed_all(&draft.name).await {
            Ok(deployed) => deployed,
            Err(KubeError::NoDeployedReleases { .. }) => Vec::new(),
            Err(e) => return Err(RollbackFailure::new(draft, Some(result), e)),
        };
        for release in deployed {
            tracing::info!(
                release = %release.name,
                revision = release.revision,
                "superseding previous deployment"
            );
            self.record(&release.superseded()).await;
        }

        Ok(Executed {
            release: draft.deployed(),
            result,
        })
    }

    /// Switch to the server dry-run client when asked, then check reachability
    async fn preflight(&mut self) -> Result<()> {
        if self.options.server_dry_run {
            self.cluster = self
                .cluster
                .server_dry_run()
                .ok_or(KubeError::ClusterCapabilityMissing {
                    capability: "server dry run",
                })?;
        }
        self.cluster.is_reachable().await
    }

    /// Failure path of the apply step
    async fn apply_failed(
        &self,
        current: Release,
        draft: Release,
        failure: ApplyFailure,
    ) -> RollbackFailure {
        let ApplyFailure { partial, error } = failure;
        let description = format!("Rollback \"{}\" failed: {}", draft.name, error);
        tracing::warn!("{}", description);

        let current = current.superseded();
        let target = draft.failed(description);
        let error = KubeError::ApplyFailed {
            name: target.name.clone(),
            revision: target.revision,
            source: Box::new(error),
        };

        if !self.options.server_dry_run {
            self.record(&current).await;
            self.record(&target).await;

            if self.options.cleanup_on_fail {
                tracing::info!(
                    release = %target.name,
                    "cleanup on fail set, cleaning up {} resources",
                    partial.created.len()
                );
                let (_, errors) = self.cluster.delete(&partial.created).await;
                if !errors.is_empty() {
                    let error = KubeError::CleanupFailed {
                        apply: Box::new(error),
                        errors: errors.iter().map(ToString::to_string).collect(),
                    };
                    return RollbackFailure::new(target, Some(partial), error);
                }
                tracing::info!(release = %target.name, "resource cleanup complete");
            }
        }

        RollbackFailure::new(target, Some(partial), error)
    }

    /// Best-effort status write
    async fn record(&self, release: &Release) {
        if let Err(e) = self.store.update(release).await {
            tracing::warn!(
                release = %release.name,
                revision = release.revision,
                "failed to record release: {}",
                e
            );
        }
    }
}

fn validate(name: &str, revision: i64) -> Result<()> {
    validate_release_name(name)?;
    if revision < 0 {
        return Err(KubeError::InvalidRevision { revision });
    }
    Ok(())
}

/// Resolve `revision` of `name` (0 meaning the one before the latest) and
/// draft the revision restoring it
///
/// Needs only the store, so a client-side dry run can plan a rollback without
/// a cluster connection.
pub async fn resolve_draft<S: StorageDriver>(
    store: &ReleaseStore<S>,
    name: &str,
    revision: i64,
) -> Result<(Release, Release)> {
    validate(name, revision)?;

    let current = store.last(name).await?;
    let designated = match revision {
        0 => current.revision.saturating_sub(1),
        revision => {
            u32::try_from(revision).map_err(|_| KubeError::InvalidRevision { revision })?
        }
    };

    tracing::info!(
        release = name,
        current = current.revision,
        target = designated,
        "rolling back"
    );
    let previous = store.get(name, designated).await?;

    let draft = Release::for_rollback(&current, &previous);
    Ok((current, draft))
}

fn build_failure(draft: Release, side: ManifestSide, error: KubeError) -> RollbackFailure {
    let error = KubeError::BuildManifest {
        name: draft.name.clone(),
        revision: draft.revision,
        side,
        message: error.to_string(),
    };
    RollbackFailure::new(draft, None, error)
}

/// Bound a readiness wait whose client was given `timeout`
async fn bounded_wait(timeout: Duration, call: impl Future<Output = Result<()>>) -> Result<()> {
    match tokio::time::timeout(timeout.saturating_add(WAIT_GRACE), call).await {
        Ok(result) => result,
        Err(_) => Err(KubeError::Timeout(format!("{}s", timeout.as_secs()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockCluster;
    use crate::hooks::{ClusterHookExecutor, MockHookExecutor};
    use crate::storage::MockStorageDriver;
    use rewind_core::{ChartRef, Hook, HookCleanupPolicy, ReleaseStatus, Values};

    const NS: &str = "default";

    /// Revision 4 runs two deployments and an autoscaler; revision 5 replaced
    /// them with a single secret.
    fn manifest(revision: u32) -> String {
        let config = format!(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: app-config\ndata:\n  revision: \"{}\"\n",
            revision
        );
        let extra = if revision == 4 {
            "---\napiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web-a\n\
             ---\napiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web-b\n\
             ---\napiVersion: autoscaling/v2\nkind: HorizontalPodAutoscaler\nmetadata:\n  name: web-hpa\n"
        } else if revision == 5 {
            "---\napiVersion: v1\nkind: Secret\nmetadata:\n  name: app-secret\n"
        } else {
            ""
        };
        format!("{}{}", config, extra)
    }

    fn release(revision: u32, status: ReleaseStatus) -> Release {
        let mut release = Release::new(
            "app",
            NS,
            ChartRef::new("app", semver::Version::new(1, revision as u64, 0)),
            Values::from_yaml(&format!("replicas: {}", revision)).unwrap(),
            manifest(revision),
        );
        release.revision = revision;
        release.status = status;
        release.description = format!("Upgrade complete ({})", revision);
        release.notes = Some(format!("notes for {}", revision));
        release
    }

    /// Revisions 1..=5, revision 5 deployed
    fn history() -> Vec<Release> {
        (1..=5)
            .map(|r| {
                let status = if r == 5 {
                    ReleaseStatus::Deployed
                } else {
                    ReleaseStatus::Superseded
                };
                release(r, status)
            })
            .collect()
    }

    struct Harness {
        driver: MockStorageDriver,
        cluster: MockCluster,
        hooks: MockHookExecutor,
    }

    impl Harness {
        fn new(cluster: MockCluster) -> Self {
            Self::with(MockStorageDriver::with_releases(history()), cluster, MockHookExecutor::new())
        }

        /// A cluster whose live state matches revision 5
        fn live_cluster() -> MockCluster {
            let cluster = MockCluster::new();
            let live = cluster.build(&manifest(5), NS).unwrap();
            let cluster = cluster.with_live(&live);
            cluster.reset_calls();
            cluster
        }

        fn with(driver: MockStorageDriver, cluster: MockCluster, hooks: MockHookExecutor) -> Self {
            Self {
                driver,
                cluster,
                hooks,
            }
        }

        fn engine(&self, options: RollbackOptions) -> Rollback<MockStorageDriver> {
            Rollback::new(
                ReleaseStore::new(self.driver.clone(), NS),
                Arc::new(self.cluster.clone()),
                Arc::new(self.hooks.clone()),
                options,
            )
        }

        fn status(&self, revision: u32) -> ReleaseStatus {
            self.driver.peek(NS, "app", revision).unwrap().status
        }

        fn stored(&self, revision: u32) -> Release {
            self.driver.peek(NS, "app", revision).unwrap()
        }
    }

    #[tokio::test]
    async fn test_resolve_previous_revision() {
        let h = Harness::new(MockCluster::new());
        let engine = h.engine(RollbackOptions::new());

        let (current, draft) = engine.resolve("app").await.unwrap();
        assert_eq!(current.revision, 5);
        assert_eq!(draft.revision, 6);
        assert_eq!(draft.status, ReleaseStatus::PendingRollback);
        assert_eq!(draft.description, "Rollback to 4");
        assert_eq!(draft.manifest, manifest(4));
        assert_eq!(draft.chart.version, semver::Version::new(1, 4, 0));
        assert_eq!(draft.config.get("replicas"), Some(&serde_json::json!(4)));
        assert_eq!(draft.notes.as_deref(), Some("notes for 4"));
        assert_eq!(draft.first_deployed, current.first_deployed);
        assert_eq!(draft.namespace, NS);

        assert_eq!(h.driver.operation_counts().mutations(), 0);
        assert_eq!(h.cluster.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_resolve_explicit_revision_verbatim() {
        let h = Harness::new(MockCluster::new());

        let (_, draft) = h
            .engine(RollbackOptions::new().to_revision(2))
            .resolve("app")
            .await
            .unwrap();
        assert_eq!(draft.description, "Rollback to 2");
        assert_eq!(draft.revision, 6);

        let (_, draft) = h
            .engine(RollbackOptions::new().to_revision(5))
            .resolve("app")
            .await
            .unwrap();
        assert_eq!(draft.description, "Rollback to 5");
        assert_eq!(draft.manifest, manifest(5));
    }

    #[tokio::test]
    async fn test_resolve_missing_revision() {
        let h = Harness::new(MockCluster::new());
        let err = h
            .engine(RollbackOptions::new().to_revision(9))
            .resolve("app")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            KubeError::ReleaseNotFound { revision: Some(9), .. }
        ));
    }

    #[tokio::test]
    async fn test_resolve_first_revision_has_no_previous() {
        let driver = MockStorageDriver::with_releases(vec![release(1, ReleaseStatus::Deployed)]);
        let h = Harness::with(driver, MockCluster::new(), MockHookExecutor::new());
        let err = h.engine(RollbackOptions::new()).resolve("app").await.unwrap_err();
        assert!(matches!(
            err,
            KubeError::ReleaseNotFound { revision: Some(0), .. }
        ));
    }

    #[tokio::test]
    async fn test_resolve_unknown_release() {
        let h = Harness::new(MockCluster::new());
        let err = h.engine(RollbackOptions::new()).resolve("ghost").await.unwrap_err();
        assert!(matches!(err, KubeError::ReleaseNotFound { ref name, .. } if name == "ghost"));
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent_except_timestamp() {
        let h = Harness::new(MockCluster::new());
        let engine = h.engine(RollbackOptions::new());

        let (_, first) = engine.resolve("app").await.unwrap();
        let (_, mut second) = engine.resolve("app").await.unwrap();
        second.last_deployed = first.last_deployed;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_invalid_name_touches_nothing() {
        let h = Harness::new(MockCluster::new());
        let err = h.engine(RollbackOptions::new()).run("Not_Valid").await.unwrap_err();

        assert!(matches!(err, KubeError::InvalidReleaseName { .. }));
        assert_eq!(h.cluster.calls().total(), 0);
        assert_eq!(h.driver.operation_counts(), Default::default());
    }

    #[tokio::test]
    async fn test_negative_revision_touches_nothing() {
        let h = Harness::new(MockCluster::new());
        let err = h
            .engine(RollbackOptions::new().to_revision(-1))
            .run("app")
            .await
            .unwrap_err();

        assert!(matches!(err, KubeError::InvalidRevision { revision: -1 }));
        assert_eq!(h.driver.operation_counts().mutations(), 0);
        assert_eq!(h.cluster.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_returns_draft_without_side_effects() {
        let h = Harness::new(MockCluster::new().unreachable());
        let report = h
            .engine(RollbackOptions::new().dry_run())
            .run("app")
            .await
            .unwrap();

        assert_eq!(report.release.revision, 6);
        assert_eq!(report.release.status, ReleaseStatus::PendingRollback);
        assert!(report.result.is_none());
        assert_eq!(h.cluster.calls().total(), 0);
        assert_eq!(h.driver.operation_counts().mutations(), 0);
        assert!(h.hooks.calls().is_empty());
    }

    #[tokio::test]
    async fn test_server_dry_run_requires_capability() {
        let h = Harness::new(MockCluster::new());
        let err = h
            .engine(RollbackOptions::new().server_dry_run())
            .run("app")
            .await
            .unwrap_err();

        assert!(matches!(err, KubeError::ClusterCapabilityMissing { .. }));
        assert_eq!(h.cluster.calls().is_reachable, 0);
        assert_eq!(h.driver.operation_counts(), Default::default());
    }

    #[tokio::test]
    async fn test_unreachable_cluster() {
        let h = Harness::new(MockCluster::new().unreachable());
        let err = h.engine(RollbackOptions::new()).run("app").await.unwrap_err();

        assert!(matches!(err, KubeError::ClusterUnreachable(_)));
        assert_eq!(h.driver.operation_counts().mutations(), 0);
    }

    #[tokio::test]
    async fn test_successful_rollback() {
        let h = Harness::new(Harness::live_cluster());
        let report = h.engine(RollbackOptions::new()).run("app").await.unwrap();

        assert_eq!(report.release.revision, 6);
        assert_eq!(report.release.status, ReleaseStatus::Deployed);
        assert_eq!(report.release.description, "Rollback to 4");

        let result = report.result.unwrap();
        assert_eq!(result.summary(), "3 created, 1 updated, 1 deleted");

        assert_eq!(h.status(6), ReleaseStatus::Deployed);
        assert_eq!(h.status(5), ReleaseStatus::Superseded);
        assert_eq!(h.stored(6).manifest, manifest(4));

        assert_eq!(
            h.hooks.phases(),
            vec![HookPhase::PreRollback, HookPhase::PostRollback]
        );
        assert!(h.hooks.calls().iter().all(|c| c.revision == 6));

        assert_eq!(
            h.cluster.live_names(),
            vec!["app-config", "web-a", "web-b", "web-hpa"]
        );
        assert_eq!(h.cluster.live("app-config").unwrap()["data"]["revision"], "4");
        assert_eq!(h.driver.operation_counts().creates, 1);
        assert_eq!(h.cluster.calls().forced_update, 0);
    }

    #[tokio::test]
    async fn test_force_reaches_cluster_update() {
        let h = Harness::new(Harness::live_cluster());
        h.engine(RollbackOptions::new().with_force())
            .run("app")
            .await
            .unwrap();

        let calls = h.cluster.calls();
        assert_eq!(calls.update, 1);
        assert_eq!(calls.forced_update, 1);
    }

    #[tokio::test]
    async fn test_success_supersedes_every_deployed_revision() {
        let mut releases = history();
        releases[2].status = ReleaseStatus::Deployed;
        let driver = MockStorageDriver::with_releases(releases);
        let h = Harness::with(driver, Harness::live_cluster(), MockHookExecutor::new());

        h.engine(RollbackOptions::new()).run("app").await.unwrap();

        assert_eq!(h.status(3), ReleaseStatus::Superseded);
        assert_eq!(h.status(5), ReleaseStatus::Superseded);
        assert_eq!(h.status(6), ReleaseStatus::Deployed);
    }

    #[tokio::test]
    async fn test_success_without_deployed_revisions() {
        let releases = history()
            .into_iter()
            .map(|r| r.failed("Upgrade failed"))
            .collect();
        let driver = MockStorageDriver::with_releases(releases);
        let h = Harness::with(driver, Harness::live_cluster(), MockHookExecutor::new());

        let report = h.engine(RollbackOptions::new()).run("app").await.unwrap();
        assert_eq!(report.release.status, ReleaseStatus::Deployed);
        assert_eq!(h.status(5), ReleaseStatus::Failed);
    }

    #[tokio::test]
    async fn test_server_dry_run_persists_nothing() {
        let h = Harness::new(Harness::live_cluster().with_server_dry_run());
        let report = h
            .engine(RollbackOptions::new().server_dry_run().with_wait(chrono::Duration::seconds(5)))
            .run("app")
            .await
            .unwrap();

        assert_eq!(report.release.status, ReleaseStatus::Deployed);
        assert_eq!(report.result.unwrap().created.len(), 3);
        assert_eq!(h.driver.operation_counts().mutations(), 0);
        assert!(h.hooks.calls().is_empty());

        let calls = h.cluster.calls();
        assert_eq!(calls.is_reachable, 1);
        assert_eq!(calls.wait, 0);
        assert_eq!(h.cluster.live_names(), vec!["app-config", "app-secret"]);
    }

    #[tokio::test]
    async fn test_server_dry_run_apply_failure_records_and_cleans_nothing() {
        let h = Harness::new(
            Harness::live_cluster()
                .with_server_dry_run()
                .fail_apply_on("web-hpa"),
        );
        let err = h
            .engine(RollbackOptions::new().server_dry_run().with_cleanup_on_fail())
            .run("app")
            .await
            .unwrap_err();

        assert!(matches!(err, KubeError::ApplyFailed { revision: 6, .. }));
        assert_eq!(h.driver.operation_counts().mutations(), 0);
        assert!(h.driver.peek(NS, "app", 6).is_none());
        assert_eq!(h.status(5), ReleaseStatus::Deployed);
        assert_eq!(h.cluster.calls().delete, 0);
        assert_eq!(h.cluster.live_names(), vec!["app-config", "app-secret"]);
    }

    #[tokio::test]
    async fn test_apply_failure_with_cleanup() {
        let h = Harness::new(Harness::live_cluster().fail_apply_on("web-hpa"));
        let err = h
            .engine(RollbackOptions::new().with_cleanup_on_fail())
            .run("app")
            .await
            .unwrap_err();

        assert!(matches!(err, KubeError::ApplyFailed { revision: 6, .. }));
        assert!(err.to_string().starts_with("Rollback \"app\" failed: "));

        assert_eq!(h.status(5), ReleaseStatus::Superseded);
        let target = h.stored(6);
        assert_eq!(target.status, ReleaseStatus::Failed);
        assert!(target.description.contains("web-hpa rejected"));

        assert_eq!(h.cluster.calls().delete, 1);
        assert_eq!(h.cluster.live_names(), vec!["app-config", "app-secret"]);
        assert_eq!(h.hooks.phases(), vec![HookPhase::PreRollback]);
    }

    #[tokio::test]
    async fn test_cleanup_failure_keeps_apply_error() {
        let h = Harness::new(
            Harness::live_cluster()
                .fail_apply_on("web-hpa")
                .fail_delete_on("web-b"),
        );
        let err = h
            .engine(RollbackOptions::new().with_cleanup_on_fail())
            .run("app")
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(matches!(err, KubeError::CleanupFailed { .. }));
        assert!(msg.contains("web-hpa rejected by the API server"));
        assert!(msg.contains("failed to delete default/Deployment/web-b"));

        assert_eq!(h.cluster.live_names(), vec!["app-config", "app-secret", "web-b"]);
        assert_eq!(h.status(5), ReleaseStatus::Superseded);
        assert_eq!(h.status(6), ReleaseStatus::Failed);
    }

    #[tokio::test]
    async fn test_apply_failure_without_cleanup_leaves_objects() {
        let h = Harness::new(Harness::live_cluster().fail_apply_on("web-hpa"));
        let failure = {
            let engine = h.engine(RollbackOptions::new());
            let (current, draft) = engine.resolve("app").await.unwrap();
            engine.execute(current, draft).await.unwrap_err()
        };

        assert_eq!(failure.release.status, ReleaseStatus::Failed);
        assert_eq!(failure.result.unwrap().created.len(), 2);
        assert_eq!(h.cluster.calls().delete, 0);
        assert!(h.cluster.live_names().contains(&"web-a".to_string()));
    }

    #[tokio::test]
    async fn test_wait_failure_marks_only_target() {
        let h = Harness::new(Harness::live_cluster().fail_wait("deployment web-a not ready"));
        let err = h
            .engine(
                RollbackOptions::new()
                    .with_wait(chrono::Duration::seconds(30))
                    .with_cleanup_on_fail(),
            )
            .run("app")
            .await
            .unwrap_err();

        assert!(matches!(err, KubeError::WaitFailed { revision: 6, .. }));
        assert!(err.to_string().starts_with("release app failed: "));

        let target = h.stored(6);
        assert_eq!(target.status, ReleaseStatus::Failed);
        assert!(target.description.starts_with("Release \"app\" failed: "));
        assert_eq!(h.status(5), ReleaseStatus::Deployed);

        assert_eq!(h.cluster.calls().delete, 0);
        assert!(h.cluster.live_names().contains(&"web-a".to_string()));
        assert_eq!(h.hooks.phases(), vec![HookPhase::PreRollback]);
    }

    #[tokio::test]
    async fn test_wait_left_to_report_its_own_deadline() {
        let h = Harness::new(Harness::live_cluster().with_wait_delay(Duration::from_millis(1200)));
        let report = h
            .engine(RollbackOptions::new().with_wait(chrono::Duration::seconds(1)))
            .run("app")
            .await
            .unwrap();

        assert_eq!(report.release.status, ReleaseStatus::Deployed);
        assert_eq!(h.cluster.calls().wait, 1);
    }

    #[tokio::test]
    async fn test_wait_for_jobs() {
        let h = Harness::new(Harness::live_cluster());
        h.engine(RollbackOptions::new().with_wait_for_jobs(chrono::Duration::seconds(30)))
            .run("app")
            .await
            .unwrap();

        let calls = h.cluster.calls();
        assert_eq!(calls.wait_with_jobs, 1);
        assert_eq!(calls.wait, 0);
    }

    #[tokio::test]
    async fn test_build_failure_changes_no_status() {
        let h = Harness::new(Harness::live_cluster().fail_build_containing("web-hpa"));
        let err = h.engine(RollbackOptions::new()).run("app").await.unwrap_err();

        assert!(matches!(
            err,
            KubeError::BuildManifest { side: ManifestSide::Target, .. }
        ));
        assert_eq!(h.status(6), ReleaseStatus::PendingRollback);
        assert_eq!(h.status(5), ReleaseStatus::Deployed);
        assert!(h.hooks.calls().is_empty());
        assert_eq!(h.cluster.calls().update, 0);
    }

    #[tokio::test]
    async fn test_build_failure_of_current_manifest() {
        let h = Harness::new(Harness::live_cluster().fail_build_containing("app-secret"));
        let err = h.engine(RollbackOptions::new()).run("app").await.unwrap_err();
        assert!(matches!(
            err,
            KubeError::BuildManifest { side: ManifestSide::Current, .. }
        ));
    }

    #[tokio::test]
    async fn test_pre_hook_failure_aborts_before_apply() {
        let driver = MockStorageDriver::with_releases(history());
        let h = Harness::with(
            driver,
            Harness::live_cluster(),
            MockHookExecutor::failing_on(HookPhase::PreRollback),
        );
        let err = h.engine(RollbackOptions::new()).run("app").await.unwrap_err();

        assert!(matches!(
            err,
            KubeError::HookFailed { phase: HookPhase::PreRollback, .. }
        ));
        assert_eq!(h.cluster.calls().update, 0);
        assert_eq!(h.status(6), ReleaseStatus::PendingRollback);
        assert_eq!(h.status(5), ReleaseStatus::Deployed);
    }

    #[tokio::test]
    async fn test_post_hook_failure_returned_as_is() {
        let driver = MockStorageDriver::with_releases(history());
        let h = Harness::with(
            driver,
            Harness::live_cluster(),
            MockHookExecutor::failing_on(HookPhase::PostRollback),
        );
        let err = h.engine(RollbackOptions::new()).run("app").await.unwrap_err();

        assert!(matches!(
            err,
            KubeError::HookFailed { phase: HookPhase::PostRollback, .. }
        ));
        assert_eq!(h.status(6), ReleaseStatus::PendingRollback);
        assert_eq!(h.status(5), ReleaseStatus::Deployed);
        assert_eq!(h.cluster.live("app-config").unwrap()["data"]["revision"], "4");
    }

    fn job_hook(name: &str, weight: i32) -> Hook {
        Hook {
            name: name.to_string(),
            kind: "Job".to_string(),
            manifest: format!("apiVersion: batch/v1\nkind: Job\nmetadata:\n  name: {}\n", name),
            phases: vec![HookPhase::PreRollback],
            weight,
            cleanup: HookCleanupPolicy::Never,
        }
    }

    /// Engine whose revision 4 carries two pre-rollback jobs, run through the cluster
    fn hooked_engine(
        cluster: &MockCluster,
        timeout: chrono::Duration,
    ) -> (MockStorageDriver, Rollback<MockStorageDriver>) {
        let mut releases = history();
        releases[3].hooks = vec![job_hook("migrate", 0), job_hook("warm-cache", 1)];
        let driver = MockStorageDriver::with_releases(releases);

        let mut options = RollbackOptions::new();
        options.timeout = Some(timeout);
        let cluster: Arc<dyn ClusterClient> = Arc::new(cluster.clone());
        let engine = Rollback::new(
            ReleaseStore::new(driver.clone(), NS),
            Arc::clone(&cluster),
            Arc::new(ClusterHookExecutor::new(cluster)),
            options,
        );
        (driver, engine)
    }

    #[tokio::test]
    async fn test_hook_phase_longer_than_timeout_when_each_hook_fits() {
        let cluster = Harness::live_cluster().with_wait_delay(Duration::from_millis(600));
        let (driver, mut engine) = hooked_engine(&cluster, chrono::Duration::seconds(1));

        let report = engine.run("app").await.unwrap();

        assert_eq!(report.release.status, ReleaseStatus::Deployed);
        assert_eq!(driver.peek(NS, "app", 6).unwrap().status, ReleaseStatus::Deployed);
        assert_eq!(cluster.calls().wait_with_jobs, 2);
    }

    #[tokio::test]
    async fn test_hook_timeout_is_a_hook_failure() {
        let cluster = Harness::live_cluster().with_wait_delay(Duration::from_millis(1500));
        let (driver, mut engine) = hooked_engine(&cluster, chrono::Duration::milliseconds(300));

        let err = engine.run("app").await.unwrap_err();

        assert!(matches!(
            err,
            KubeError::HookFailed {
                ref name,
                revision: 6,
                ref hook_name,
                phase: HookPhase::PreRollback,
                ref message,
            } if name == "app" && hook_name == "migrate" && message.contains("timed out")
        ));
        assert_eq!(driver.peek(NS, "app", 6).unwrap().status, ReleaseStatus::PendingRollback);
        assert_eq!(driver.peek(NS, "app", 5).unwrap().status, ReleaseStatus::Deployed);
        assert!(!cluster.live_names().contains(&"web-a".to_string()));
        assert_eq!(cluster.calls().wait_with_jobs, 1);
    }

    #[tokio::test]
    async fn test_disabled_hooks() {
        let h = Harness::new(Harness::live_cluster());
        h.engine(RollbackOptions::new().without_hooks())
            .run("app")
            .await
            .unwrap();

        assert!(h.hooks.calls().is_empty());
        assert_eq!(h.status(6), ReleaseStatus::Deployed);
    }

    #[tokio::test]
    async fn test_recreate_failure_is_not_fatal() {
        let h = Harness::new(Harness::live_cluster().fail_recreate("pods are protected"));
        let report = h
            .engine(RollbackOptions::new().with_recreate())
            .run("app")
            .await
            .unwrap();

        assert_eq!(report.release.status, ReleaseStatus::Deployed);
        assert_eq!(h.cluster.calls().recreate_pods, 1);
    }

    #[tokio::test]
    async fn test_max_history_forwarded_to_store() {
        let h = Harness::new(Harness::live_cluster());
        let mut engine = h.engine(RollbackOptions::new().with_max_history(3));
        engine.run("app").await.unwrap();

        assert_eq!(engine.store().max_history(), 3);
        let revisions: Vec<u32> = h
            .driver
            .history(NS, "app")
            .await
            .unwrap()
            .iter()
            .map(|r| r.revision)
            .collect();
        assert_eq!(revisions, vec![6, 5, 4]);
    }

    #[tokio::test]
    async fn test_final_update_happens_once() {
        let h = Harness::new(Harness::live_cluster());
        h.engine(RollbackOptions::new()).run("app").await.unwrap();

        // one supersede record plus the final write
        assert_eq!(h.driver.operation_counts().updates, 2);
    }
}

//! Mock cluster client for testing
//!
//! Keeps live objects in memory and lets tests inject failures at each step
//! of a rollback. Clones, and the server dry-run variant, share state.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use super::order::is_cluster_scoped_kind;
use super::{ApplyFailure, ClusterClient, ClusterResult, ObjectKey, ObjectSet, UpdatedObject};
use crate::error::{KubeError, Result};

/// In-memory cluster client
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<RwLock<MockState>>,
    dry_run: bool,
}

#[derive(Default)]
struct MockState {
    live: BTreeMap<ObjectKey, JsonValue>,
    failures: Failures,
    supports_dry_run: bool,
    wait_delay: Option<Duration>,
    calls: CallCounts,
}

#[derive(Default)]
struct Failures {
    unreachable: bool,
    build_containing: Option<String>,
    apply_on: Option<String>,
    delete_on: HashSet<String>,
    wait: Option<String>,
    recreate: Option<String>,
}

/// Counts of client calls for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallCounts {
    pub is_reachable: usize,
    pub build: usize,
    pub update: usize,
    pub wait: usize,
    pub wait_with_jobs: usize,
    pub delete: usize,
    pub recreate_pods: usize,
    pub server_dry_run: usize,
    /// Updates requested with `force`; also counted in `update`
    pub forced_update: usize,
}

impl CallCounts {
    /// Total calls of any kind
    pub fn total(&self) -> usize {
        self.is_reachable
            + self.build
            + self.update
            + self.wait
            + self.wait_with_jobs
            + self.delete
            + self.recreate_pods
            + self.server_dry_run
    }
}

impl MockCluster {
    /// Create an empty, reachable cluster without dry-run support
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state(self, f: impl FnOnce(&mut MockState)) -> Self {
        f(&mut self.state.write().unwrap());
        self
    }

    /// Seed live objects
    pub fn with_live(self, objects: &ObjectSet) -> Self {
        self.with_state(|s| {
            for object in objects {
                s.live.insert(object.key(), object.body.clone());
            }
        })
    }

    /// Offer a server dry-run variant
    pub fn with_server_dry_run(self) -> Self {
        self.with_state(|s| s.supports_dry_run = true)
    }

    /// Fail `is_reachable`
    pub fn unreachable(self) -> Self {
        self.with_state(|s| s.failures.unreachable = true)
    }

    /// Fail `build` for manifests containing `fragment`
    pub fn fail_build_containing(self, fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        self.with_state(|s| s.failures.build_containing = Some(fragment))
    }

    /// Reject the apply of the object called `name`
    pub fn fail_apply_on(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.with_state(|s| s.failures.apply_on = Some(name))
    }

    /// Fail deletion of the object called `name`
    pub fn fail_delete_on(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.with_state(|s| {
            s.failures.delete_on.insert(name);
        })
    }

    /// Fail readiness waits with `message`
    pub fn fail_wait(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.with_state(|s| s.failures.wait = Some(message))
    }

    /// Fail pod recreation with `message`
    pub fn fail_recreate(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.with_state(|s| s.failures.recreate = Some(message))
    }

    /// Make every readiness wait take `delay` before reporting
    pub fn with_wait_delay(self, delay: Duration) -> Self {
        self.with_state(|s| s.wait_delay = Some(delay))
    }

    /// Get call counts for assertions
    pub fn calls(&self) -> CallCounts {
        self.state.read().unwrap().calls.clone()
    }

    /// Forget call counts recorded so far
    pub fn reset_calls(&self) {
        self.state.write().unwrap().calls = CallCounts::default();
    }

    /// Names of live objects, sorted by identity
    pub fn live_names(&self) -> Vec<String> {
        self.state
            .read()
            .unwrap()
            .live
            .keys()
            .map(|k| k.name.clone())
            .collect()
    }

    /// Live body of the object called `name`
    pub fn live(&self, name: &str) -> Option<JsonValue> {
        self.state
            .read()
            .unwrap()
            .live
            .iter()
            .find(|(k, _)| k.name == name)
            .map(|(_, v)| v.clone())
    }

    fn count(&self, f: impl FnOnce(&mut CallCounts)) {
        f(&mut self.state.write().unwrap().calls);
    }

    async fn settle(&self) -> Result<()> {
        let delay = self.state.read().unwrap().wait_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match &self.state.read().unwrap().failures.wait {
            Some(message) => Err(KubeError::Timeout(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn is_reachable(&self) -> Result<()> {
        self.count(|c| c.is_reachable += 1);
        if self.state.read().unwrap().failures.unreachable {
            return Err(KubeError::ClusterUnreachable(
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }

    fn build(&self, manifest: &str, namespace: &str) -> Result<ObjectSet> {
        self.count(|c| c.build += 1);
        if let Some(fragment) = &self.state.read().unwrap().failures.build_containing {
            if manifest.contains(fragment.as_str()) {
                return Err(KubeError::InvalidManifest(format!(
                    "unknown resource type in manifest containing {:?}",
                    fragment
                )));
            }
        }

        Ok(ObjectSet::from_manifest(manifest, namespace)?
            .into_iter()
            .map(|o| {
                if is_cluster_scoped_kind(&o.kind) {
                    o.cluster_scoped()
                } else {
                    o
                }
            })
            .collect())
    }

    async fn update(
        &self,
        current: &ObjectSet,
        target: &ObjectSet,
        force: bool,
    ) -> std::result::Result<ClusterResult, ApplyFailure> {
        self.count(|c| {
            c.update += 1;
            if force {
                c.forced_update += 1;
            }
        });
        let mut state = self.state.write().unwrap();
        let mut result = ClusterResult::default();

        for object in target.sorted_for_apply() {
            if state.failures.apply_on.as_deref() == Some(object.name.as_str()) {
                let error = KubeError::InvalidConfig(format!(
                    "{} rejected by the API server",
                    object.display_name()
                ));
                return Err(ApplyFailure::new(result, error));
            }

            let key = object.key();
            match state.live.get(&key).cloned() {
                Some(live_before) => result.updated.push(UpdatedObject {
                    target: object.clone(),
                    live_before,
                }),
                None => result.created.insert(object.clone()),
            }
            if !self.dry_run {
                state.live.insert(key, object.body.clone());
            }
        }

        let mut errors = Vec::new();
        for object in current.difference(target).sorted_for_delete() {
            if object.has_keep_policy() {
                continue;
            }
            if state.failures.delete_on.contains(&object.name) {
                errors.push(format!("failed to delete {}: forbidden", object.display_name()));
                continue;
            }
            if state.live.contains_key(&object.key()) {
                if !self.dry_run {
                    state.live.remove(&object.key());
                }
                result.deleted.insert(object.clone());
            }
        }

        if errors.is_empty() {
            Ok(result)
        } else {
            Err(ApplyFailure::new(
                result,
                KubeError::InvalidConfig(errors.join(", ")),
            ))
        }
    }

    async fn wait(&self, _objects: &ObjectSet, _timeout: Duration) -> Result<()> {
        self.count(|c| c.wait += 1);
        self.settle().await
    }

    async fn wait_with_jobs(&self, _objects: &ObjectSet, _timeout: Duration) -> Result<()> {
        self.count(|c| c.wait_with_jobs += 1);
        self.settle().await
    }

    async fn delete(&self, objects: &ObjectSet) -> (usize, Vec<KubeError>) {
        self.count(|c| c.delete += 1);
        let mut state = self.state.write().unwrap();
        let mut deleted = 0;
        let mut errors = Vec::new();

        for object in objects.sorted_for_delete() {
            if state.failures.delete_on.contains(&object.name) {
                errors.push(KubeError::InvalidConfig(format!(
                    "failed to delete {}: forbidden",
                    object.display_name()
                )));
                continue;
            }
            let existed = if self.dry_run {
                state.live.contains_key(&object.key())
            } else {
                state.live.remove(&object.key()).is_some()
            };
            if existed {
                deleted += 1;
            }
        }
        (deleted, errors)
    }

    async fn recreate_pods(&self, _updated: &[UpdatedObject]) -> Result<()> {
        self.count(|c| c.recreate_pods += 1);
        match &self.state.read().unwrap().failures.recreate {
            Some(message) => Err(KubeError::InvalidConfig(message.clone())),
            None => Ok(()),
        }
    }

    fn server_dry_run(&self) -> Option<Arc<dyn ClusterClient>> {
        self.count(|c| c.server_dry_run += 1);
        if !self.state.read().unwrap().supports_dry_run {
            return None;
        }
        Some(Arc::new(Self {
            state: Arc::clone(&self.state),
            dry_run: true,
        }))
    }
}

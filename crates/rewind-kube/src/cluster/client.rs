//! kube-rs backed cluster client
//!
//! Objects are applied with Server-Side Apply under the `rewind` field
//! manager. Kinds are resolved through API discovery once, at connect time.

use async_trait::async_trait;
use futures::future::try_join_all;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams, PropagationPolicy},
    core::GroupVersionKind,
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::readiness::{self, Readiness};
use super::{ApplyFailure, ClusterClient, ClusterResult, ObjectSet, ResourceObject, UpdatedObject};
use crate::error::{KubeError, Result};

/// Field manager name for Server-Side Apply
const FIELD_MANAGER: &str = "rewind";

/// Delay between readiness polls
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How long a forced replacement waits for the old object to disappear
const REPLACE_GRACE: Duration = Duration::from_secs(60);

/// Cluster client talking to a real API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    discovery: Arc<Discovery>,
    dry_run: bool,
}

impl KubeCluster {
    /// Connect using the ambient kubeconfig or in-cluster configuration
    pub async fn connect() -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| KubeError::ClusterUnreachable(e.to_string()))?;
        Self::with_client(client).await
    }

    /// Wrap an existing client, running API discovery
    pub async fn with_client(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(|e| KubeError::ClusterUnreachable(e.to_string()))?;
        Ok(Self::with_discovery(client, discovery))
    }

    /// Wrap an existing client and discovery cache
    pub fn with_discovery(client: Client, discovery: Discovery) -> Self {
        Self {
            client,
            discovery: Arc::new(discovery),
            dry_run: false,
        }
    }

    fn resolve(&self, object: &ResourceObject) -> Result<(ApiResource, ApiCapabilities)> {
        let gvk = GroupVersionKind::gvk(object.group(), object.version(), &object.kind);
        self.discovery.resolve_gvk(&gvk).ok_or_else(|| {
            KubeError::InvalidManifest(format!(
                "unknown resource type {}/{}",
                object.api_version, object.kind
            ))
        })
    }

    fn api_for(&self, object: &ResourceObject) -> Result<Api<DynamicObject>> {
        let (resource, _) = self.resolve(object)?;
        Ok(match &object.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        })
    }

    fn apply_params(&self) -> PatchParams {
        let mut params = PatchParams::apply(FIELD_MANAGER).force();
        params.dry_run = self.dry_run;
        params
    }

    fn delete_params(&self) -> DeleteParams {
        DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            dry_run: self.dry_run,
            ..Default::default()
        }
    }

    /// Apply one object, returning its live state before the apply
    async fn apply_one(
        &self,
        object: &ResourceObject,
        force: bool,
    ) -> Result<Option<serde_json::Value>> {
        let api = self.api_for(object)?;
        let live = api
            .get_opt(&object.name)
            .await
            .map_err(|source| failed("read", object, source))?;

        let applied = api
            .patch(&object.name, &self.apply_params(), &Patch::Apply(&object.body))
            .await;

        match applied {
            Ok(_) => {}
            Err(kube::Error::Api(resp)) if force && resp.code == 422 && live.is_some() => {
                tracing::info!(object = %object.display_name(), "replacing object rejected as invalid");
                self.replace(&api, object).await?;
            }
            Err(source) => return Err(failed("apply", object, source)),
        }

        live.map(serde_json::to_value).transpose().map_err(Into::into)
    }

    /// Delete an object and create it again from its manifest
    async fn replace(&self, api: &Api<DynamicObject>, object: &ResourceObject) -> Result<()> {
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Foreground),
            dry_run: self.dry_run,
            ..Default::default()
        };
        match api.delete(&object.name, &params).await {
            Ok(_) => {}
            Err(kube::Error::Api(resp)) if resp.code == 404 => {}
            Err(source) => return Err(failed("delete", object, source)),
        }

        if !self.dry_run {
            let deadline = Instant::now() + REPLACE_GRACE;
            while api
                .get_opt(&object.name)
                .await
                .map_err(|source| failed("read", object, source))?
                .is_some()
            {
                if Instant::now() >= deadline {
                    return Err(KubeError::Timeout(format!(
                        "{}s waiting for {} to be deleted",
                        REPLACE_GRACE.as_secs(),
                        object.display_name()
                    )));
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }

        let body: DynamicObject = serde_json::from_value(object.body.clone())?;
        let params = PostParams {
            dry_run: self.dry_run,
            field_manager: Some(FIELD_MANAGER.to_string()),
        };
        api.create(&params, &body)
            .await
            .map_err(|source| failed("create", object, source))?;
        Ok(())
    }

    /// Delete one object; `Ok(false)` when it was already gone
    async fn delete_one(&self, object: &ResourceObject) -> Result<bool> {
        let api = self.api_for(object)?;
        match api.delete(&object.name, &self.delete_params()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(source) => Err(failed("delete", object, source)),
        }
    }

    /// Current readiness of one object; kinds without a check are ready
    async fn readiness(&self, object: &ResourceObject, with_jobs: bool) -> Result<Readiness> {
        let ns = object.namespace.as_deref().unwrap_or("default");
        let name = object.name.as_str();
        let missing = || Readiness::Pending("not found".to_string());

        let state = match object.kind.as_str() {
            "Deployment" => Api::<Deployment>::namespaced(self.client.clone(), ns)
                .get_opt(name)
                .await
                .map(|d| d.as_ref().map_or_else(missing, readiness::deployment)),
            "StatefulSet" => Api::<StatefulSet>::namespaced(self.client.clone(), ns)
                .get_opt(name)
                .await
                .map(|s| s.as_ref().map_or_else(missing, readiness::statefulset)),
            "DaemonSet" => Api::<DaemonSet>::namespaced(self.client.clone(), ns)
                .get_opt(name)
                .await
                .map(|d| d.as_ref().map_or_else(missing, readiness::daemonset)),
            "Job" if with_jobs => Api::<Job>::namespaced(self.client.clone(), ns)
                .get_opt(name)
                .await
                .map(|j| j.as_ref().map_or_else(missing, readiness::job)),
            _ => Ok(Readiness::Ready),
        };
        state.map_err(|source| failed("read", object, source))
    }

    async fn wait_for(&self, objects: &ObjectSet, timeout: Duration, with_jobs: bool) -> Result<()> {
        let deadline = Instant::now() + timeout;
        tracing::debug!(
            objects = objects.len(),
            timeout = timeout.as_secs(),
            with_jobs,
            "waiting for resources"
        );

        loop {
            let states = try_join_all(objects.iter().map(|o| async move {
                self.readiness(o, with_jobs).await.map(|r| (o, r))
            }))
            .await?;

            let mut pending = Vec::new();
            for (object, state) in states {
                match state {
                    Readiness::Ready => {}
                    Readiness::Failed(message) => {
                        return Err(KubeError::NotReady {
                            resource: object.display_name(),
                            message,
                        });
                    }
                    Readiness::Pending(message) => {
                        pending.push(format!("{} ({})", object.display_name(), message));
                    }
                }
            }

            if pending.is_empty() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(KubeError::Timeout(format!(
                    "{}s waiting for {}",
                    timeout.as_secs(),
                    pending.join(", ")
                )));
            }
            tracing::debug!("still waiting for {}", pending.join(", "));
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

fn failed(action: &'static str, object: &ResourceObject, source: kube::Error) -> KubeError {
    KubeError::ObjectFailed {
        action,
        object: object.display_name(),
        source,
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn is_reachable(&self) -> Result<()> {
        self.client
            .apiserver_version()
            .await
            .map(|_| ())
            .map_err(|e| KubeError::ClusterUnreachable(e.to_string()))
    }

    fn build(&self, manifest: &str, namespace: &str) -> Result<ObjectSet> {
        ObjectSet::from_manifest(manifest, namespace)?
            .into_iter()
            .map(|object| {
                let (_, capabilities) = self.resolve(&object)?;
                Ok(if capabilities.scope == Scope::Cluster {
                    object.cluster_scoped()
                } else {
                    object
                })
            })
            .collect()
    }

    async fn update(
        &self,
        current: &ObjectSet,
        target: &ObjectSet,
        force: bool,
    ) -> std::result::Result<ClusterResult, ApplyFailure> {
        let mut result = ClusterResult::default();

        for object in target.sorted_for_apply() {
            match self.apply_one(object, force).await {
                Ok(Some(live_before)) => {
                    tracing::debug!(object = %object.display_name(), "updated");
                    result.updated.push(UpdatedObject {
                        target: object.clone(),
                        live_before,
                    });
                }
                Ok(None) => {
                    tracing::debug!(object = %object.display_name(), "created");
                    result.created.insert(object.clone());
                }
                Err(e) => return Err(ApplyFailure::new(result, e)),
            }
        }

        let mut errors = Vec::new();
        for object in current.difference(target).sorted_for_delete() {
            if object.has_keep_policy() {
                tracing::info!(object = %object.display_name(), "keeping object per resource policy");
                continue;
            }
            match self.delete_one(object).await {
                Ok(true) => result.deleted.insert(object.clone()),
                Ok(false) => {}
                Err(e) => errors.push(e.to_string()),
            }
        }

        if errors.is_empty() {
            Ok(result)
        } else {
            let error = KubeError::InvalidConfig(format!(
                "failed to delete objects no longer in the manifest: {}",
                errors.join(", ")
            ));
            Err(ApplyFailure::new(result, error))
        }
    }

    async fn wait(&self, objects: &ObjectSet, timeout: Duration) -> Result<()> {
        self.wait_for(objects, timeout, false).await
    }

    async fn wait_with_jobs(&self, objects: &ObjectSet, timeout: Duration) -> Result<()> {
        self.wait_for(objects, timeout, true).await
    }

    async fn delete(&self, objects: &ObjectSet) -> (usize, Vec<KubeError>) {
        let mut deleted = 0;
        let mut errors = Vec::new();
        for object in objects.sorted_for_delete() {
            match self.delete_one(object).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => errors.push(e),
            }
        }
        (deleted, errors)
    }

    async fn recreate_pods(&self, updated: &[UpdatedObject]) -> Result<()> {
        for workload in updated.iter().map(|u| &u.target).filter(|o| {
            matches!(
                o.kind.as_str(),
                "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet"
            )
        }) {
            let Some(labels) = workload.match_labels() else {
                continue;
            };
            let selector = labels
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(",");
            let ns = workload.namespace.as_deref().unwrap_or("default");

            tracing::debug!(workload = %workload.display_name(), %selector, "recreating pods");
            Api::<Pod>::namespaced(self.client.clone(), ns)
                .delete_collection(&self.delete_params(), &ListParams::default().labels(&selector))
                .await
                .map_err(|source| failed("recreate pods of", workload, source))?;
        }
        Ok(())
    }

    fn server_dry_run(&self) -> Option<Arc<dyn ClusterClient>> {
        Some(Arc::new(Self {
            dry_run: true,
            ..self.clone()
        }))
    }
}

//! Cluster access for the rollback engine
//!
//! A manifest is turned into an [`ObjectSet`] by [`ClusterClient::build`]; the
//! client then reconciles the live cluster from one set to another and reports
//! what it touched as a [`ClusterResult`].
//!
//! Two implementations ship:
//! - [`KubeCluster`]: kube-rs backed, server-side apply
//! - [`MockCluster`]: in-memory, with injectable failures for tests

mod client;
mod mock;
mod order;
pub mod readiness;

pub use client::KubeCluster;
pub use mock::{CallCounts, MockCluster};
pub use order::ResourceCategory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{KubeError, Result};

/// Annotation keeping an object in place when it leaves the manifest (Helm-compatible)
pub const RESOURCE_POLICY_ANNOTATION: &str = "helm.sh/resource-policy";
/// rewind-specific spelling of the same policy
pub const REWIND_RESOURCE_POLICY_ANNOTATION: &str = "rewind.io/resource-policy";
const RESOURCE_POLICY_KEEP: &str = "keep";

/// Identity of an object in the cluster, independent of its API version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub group: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", ns, self.kind, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// A single object parsed from a manifest
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceObject {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Full object as sent to the API server
    #[serde(skip)]
    pub body: JsonValue,
}

impl ResourceObject {
    /// Build an object from a decoded document
    ///
    /// `default_namespace` is filled in when the document has none; callers
    /// that know the object is cluster-scoped clear it with [`Self::cluster_scoped`].
    pub fn from_value(mut body: JsonValue, default_namespace: &str) -> Result<Self> {
        let field = |body: &JsonValue, pointer: &str| {
            body.pointer(pointer)
                .and_then(JsonValue::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let api_version = field(&body, "/apiVersion")
            .ok_or_else(|| KubeError::InvalidManifest("object is missing apiVersion".into()))?;
        let kind = field(&body, "/kind")
            .ok_or_else(|| KubeError::InvalidManifest("object is missing kind".into()))?;
        let name = field(&body, "/metadata/name").ok_or_else(|| {
            KubeError::InvalidManifest(format!("{} object is missing metadata.name", kind))
        })?;

        let namespace =
            field(&body, "/metadata/namespace").unwrap_or_else(|| default_namespace.to_string());
        if let Some(metadata) = body.get_mut("metadata").and_then(JsonValue::as_object_mut) {
            metadata.insert("namespace".into(), JsonValue::String(namespace.clone()));
        }

        Ok(Self {
            api_version,
            kind,
            name,
            namespace: Some(namespace),
            body,
        })
    }

    /// Drop the namespace of an object the API server treats as cluster-scoped
    pub fn cluster_scoped(mut self) -> Self {
        self.namespace = None;
        if let Some(metadata) = self.body.get_mut("metadata").and_then(JsonValue::as_object_mut) {
            metadata.remove("namespace");
        }
        self
    }

    /// API group, empty for the core group
    pub fn group(&self) -> &str {
        self.api_version
            .rsplit_once('/')
            .map(|(group, _)| group)
            .unwrap_or("")
    }

    /// API version without the group
    pub fn version(&self) -> &str {
        self.api_version
            .rsplit_once('/')
            .map(|(_, version)| version)
            .unwrap_or(&self.api_version)
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            group: self.group().to_string(),
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    /// Human-readable identity for logs and errors
    pub fn display_name(&self) -> String {
        self.key().to_string()
    }

    /// Apply-order category
    pub fn category(&self) -> ResourceCategory {
        ResourceCategory::from_resource(&self.kind, &self.api_version)
    }

    /// Read a `metadata.annotations` entry
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.body
            .pointer("/metadata/annotations")
            .and_then(|a| a.get(key))
            .and_then(JsonValue::as_str)
    }

    /// Whether the object asks to be left in place when dropped from a manifest
    pub fn has_keep_policy(&self) -> bool {
        [RESOURCE_POLICY_ANNOTATION, REWIND_RESOURCE_POLICY_ANNOTATION]
            .iter()
            .any(|key| self.annotation(key) == Some(RESOURCE_POLICY_KEEP))
    }

    /// `spec.selector.matchLabels` of a workload, if any
    pub fn match_labels(&self) -> Option<Vec<(String, String)>> {
        let labels = self
            .body
            .pointer("/spec/selector/matchLabels")?
            .as_object()?
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect::<Vec<_>>();
        if labels.is_empty() { None } else { Some(labels) }
    }
}

/// Ordered collection of objects built from one manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ObjectSet(Vec<ResourceObject>);

impl ObjectSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a multi-document YAML manifest
    ///
    /// Empty and comment-only documents are skipped. Later documents replace
    /// earlier ones with the same identity.
    pub fn from_manifest(manifest: &str, default_namespace: &str) -> Result<Self> {
        let mut set = Self::new();
        for (index, document) in serde_yaml::Deserializer::from_str(manifest).enumerate() {
            let value = serde_yaml::Value::deserialize(document).map_err(|e| {
                KubeError::InvalidManifest(format!("document {}: {}", index, e))
            })?;
            if value.is_null() {
                continue;
            }
            let body = serde_json::to_value(&value).map_err(|e| {
                KubeError::InvalidManifest(format!("document {}: {}", index, e))
            })?;
            let object =
                ResourceObject::from_value(body, default_namespace).map_err(|e| match e {
                    KubeError::InvalidManifest(m) => {
                        KubeError::InvalidManifest(format!("document {}: {}", index, m))
                    }
                    other => other,
                })?;
            set.insert(object);
        }
        Ok(set)
    }

    /// Add an object, replacing one with the same identity
    pub fn insert(&mut self, object: ResourceObject) {
        let key = object.key();
        match self.0.iter_mut().find(|o| o.key() == key) {
            Some(existing) => *existing = object,
            None => self.0.push(object),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResourceObject> {
        self.0.iter()
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&ResourceObject> {
        self.0.iter().find(|o| &o.key() == key)
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.get(key).is_some()
    }

    /// Objects of `self` whose identity is absent from `other`
    pub fn difference(&self, other: &ObjectSet) -> ObjectSet {
        self.0
            .iter()
            .filter(|o| !other.contains(&o.key()))
            .cloned()
            .collect()
    }

    /// Objects in creation order: dependencies first, manifest order within a category
    pub fn sorted_for_apply(&self) -> Vec<&ResourceObject> {
        let mut sorted: Vec<&ResourceObject> = self.0.iter().collect();
        sorted.sort_by_key(|o| o.category());
        sorted
    }

    /// Objects in deletion order, the reverse of creation order
    pub fn sorted_for_delete(&self) -> Vec<&ResourceObject> {
        let mut sorted = self.sorted_for_apply();
        sorted.reverse();
        sorted
    }
}

impl FromIterator<ResourceObject> for ObjectSet {
    fn from_iter<I: IntoIterator<Item = ResourceObject>>(iter: I) -> Self {
        let mut set = ObjectSet::new();
        for object in iter {
            set.insert(object);
        }
        set
    }
}

impl IntoIterator for ObjectSet {
    type Item = ResourceObject;
    type IntoIter = std::vec::IntoIter<ResourceObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ObjectSet {
    type Item = &'a ResourceObject;
    type IntoIter = std::slice::Iter<'a, ResourceObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// An object that existed before the apply, paired with its live state at that time
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedObject {
    pub target: ResourceObject,
    #[serde(skip)]
    pub live_before: JsonValue,
}

/// What an apply did to the cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterResult {
    pub created: ObjectSet,
    pub updated: Vec<UpdatedObject>,
    pub deleted: ObjectSet,
}

impl ClusterResult {
    /// One-line summary such as "2 created, 1 updated, 0 deleted"
    pub fn summary(&self) -> String {
        format!(
            "{} created, {} updated, {} deleted",
            self.created.len(),
            self.updated.len(),
            self.deleted.len()
        )
    }
}

/// A failed apply together with whatever it managed to do first
#[derive(Debug)]
pub struct ApplyFailure {
    pub partial: ClusterResult,
    pub error: KubeError,
}

impl ApplyFailure {
    pub fn new(partial: ClusterResult, error: KubeError) -> Self {
        Self { partial, error }
    }
}

/// Operations the rollback engine needs from a cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Check that the API server answers
    async fn is_reachable(&self) -> Result<()>;

    /// Turn a manifest into objects, resolving their scope
    fn build(&self, manifest: &str, namespace: &str) -> Result<ObjectSet>;

    /// Move live state from `current` to `target`
    ///
    /// Objects only in `target` are created, objects in both are updated and
    /// objects only in `current` are deleted.
    async fn update(
        &self,
        current: &ObjectSet,
        target: &ObjectSet,
        force: bool,
    ) -> std::result::Result<ClusterResult, ApplyFailure>;

    /// Wait for workloads in `objects` to become ready
    async fn wait(&self, objects: &ObjectSet, timeout: Duration) -> Result<()>;

    /// Like [`Self::wait`], also waiting for Jobs to complete
    async fn wait_with_jobs(&self, objects: &ObjectSet, timeout: Duration) -> Result<()>;

    /// Delete objects, returning how many were removed and every error hit
    async fn delete(&self, objects: &ObjectSet) -> (usize, Vec<KubeError>);

    /// Delete the pods of updated workloads so their controllers recreate them
    async fn recreate_pods(&self, updated: &[UpdatedObject]) -> Result<()>;

    /// A variant of this client that validates requests server-side without persisting
    fn server_dry_run(&self) -> Option<Arc<dyn ClusterClient>> {
        None
    }
}

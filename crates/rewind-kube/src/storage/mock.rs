//! Mock storage driver for testing
//!
//! This driver stores releases in memory, useful for unit tests
//! without requiring a Kubernetes cluster.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use rewind_core::Release;

use super::StorageDriver;
use crate::error::{KubeError, Result};

type Revisions = BTreeMap<u32, Release>;

/// In-memory storage driver for testing
#[derive(Clone, Default)]
pub struct MockStorageDriver {
    /// Storage: namespace -> name -> revision -> release
    store: Arc<RwLock<HashMap<String, HashMap<String, Revisions>>>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl OperationCounts {
    /// Number of operations that changed stored state
    pub fn mutations(&self) -> usize {
        self.creates + self.updates + self.deletes
    }
}

impl MockStorageDriver {
    /// Create a new empty mock driver
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated releases
    pub fn with_releases(releases: Vec<Release>) -> Self {
        let driver = Self::new();
        {
            let mut store = driver.store.write().unwrap();
            for release in releases {
                store
                    .entry(release.namespace.clone())
                    .or_default()
                    .entry(release.name.clone())
                    .or_default()
                    .insert(release.revision, release);
            }
        }
        driver
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations.read().unwrap().clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        *self.operations.write().unwrap() = OperationCounts::default();
    }

    /// Read a stored revision without counting the access
    pub fn peek(&self, namespace: &str, name: &str, revision: u32) -> Option<Release> {
        self.store
            .read()
            .unwrap()
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .and_then(|revisions| revisions.get(&revision))
            .cloned()
    }

    /// Count total releases
    pub fn release_count(&self) -> usize {
        let store = self.store.read().unwrap();
        store
            .values()
            .flat_map(|ns| ns.values())
            .map(|revisions| revisions.len())
            .sum()
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        f(&mut self.operations.write().unwrap());
    }
}

fn not_found(namespace: &str, name: &str, revision: Option<u32>) -> KubeError {
    KubeError::ReleaseNotFound {
        name: name.to_string(),
        namespace: namespace.to_string(),
        revision,
    }
}

#[async_trait]
impl StorageDriver for MockStorageDriver {
    async fn get(&self, namespace: &str, name: &str, revision: u32) -> Result<Release> {
        self.count(|ops| ops.gets += 1);

        let store = self.store.read().unwrap();
        store
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .and_then(|revisions| revisions.get(&revision))
            .cloned()
            .ok_or_else(|| not_found(namespace, name, Some(revision)))
    }

    async fn get_latest(&self, namespace: &str, name: &str) -> Result<Release> {
        self.count(|ops| ops.gets += 1);

        let store = self.store.read().unwrap();
        store
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .and_then(|revisions| revisions.values().next_back())
            .cloned()
            .ok_or_else(|| not_found(namespace, name, None))
    }

    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<Release>> {
        self.count(|ops| ops.lists += 1);

        let store = self.store.read().unwrap();
        let releases: Vec<Release> = store
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .map(|revisions| revisions.values().rev().cloned().collect())
            .unwrap_or_default();

        if releases.is_empty() {
            return Err(not_found(namespace, name, None));
        }
        Ok(releases)
    }

    async fn create(&self, release: &Release) -> Result<()> {
        self.count(|ops| ops.creates += 1);

        let mut store = self.store.write().unwrap();
        let revisions = store
            .entry(release.namespace.clone())
            .or_default()
            .entry(release.name.clone())
            .or_default();

        if revisions.contains_key(&release.revision) {
            return Err(KubeError::ReleaseAlreadyExists {
                name: release.name.clone(),
                namespace: release.namespace.clone(),
                revision: release.revision,
            });
        }

        revisions.insert(release.revision, release.clone());
        Ok(())
    }

    async fn update(&self, release: &Release) -> Result<()> {
        self.count(|ops| ops.updates += 1);

        let mut store = self.store.write().unwrap();
        let revision = store
            .get_mut(&release.namespace)
            .and_then(|ns| ns.get_mut(&release.name))
            .and_then(|revisions| revisions.get_mut(&release.revision))
            .ok_or_else(|| not_found(&release.namespace, &release.name, Some(release.revision)))?;

        *revision = release.clone();
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str, revision: u32) -> Result<Release> {
        self.count(|ops| ops.deletes += 1);

        let mut store = self.store.write().unwrap();
        store
            .get_mut(namespace)
            .and_then(|ns| ns.get_mut(name))
            .and_then(|revisions| revisions.remove(&revision))
            .ok_or_else(|| not_found(namespace, name, Some(revision)))
    }
}

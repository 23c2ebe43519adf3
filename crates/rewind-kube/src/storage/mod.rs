//! Storage drivers for persisting release information
//!
//! rewind ships two backends:
//! - **File**: one compressed JSON document per revision on local disk
//! - **Mock**: in-memory, with operation counters for tests
//!
//! [`ReleaseStore`] scopes a driver to one namespace and adds the queries the
//! rollback engine needs (latest revision, deployed revisions) plus the
//! history retention cap.

mod file;
mod mock;

pub use file::FileDriver;
pub use mock::{MockStorageDriver, OperationCounts};

use async_trait::async_trait;
use rewind_core::{Release, ReleaseStatus};

use crate::error::{KubeError, Result};

/// Storage driver trait for release persistence
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Get a specific release by name and revision
    async fn get(&self, namespace: &str, name: &str, revision: u32) -> Result<Release>;

    /// Get the latest release for a name
    async fn get_latest(&self, namespace: &str, name: &str) -> Result<Release>;

    /// Get release history (all revisions for a name, newest first)
    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<Release>>;

    /// Create a new release revision; fails if the revision exists
    async fn create(&self, release: &Release) -> Result<()>;

    /// Update an existing release revision
    async fn update(&self, release: &Release) -> Result<()>;

    /// Delete a specific release revision
    async fn delete(&self, namespace: &str, name: &str, revision: u32) -> Result<Release>;
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Compression method
    pub compression: CompressionMethod,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::Zstd { level: 3 },
        }
    }
}

/// Compression method for release data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression
    None,

    /// Gzip compression
    Gzip { level: u32 },

    /// Zstd compression (better ratio, faster)
    Zstd { level: i32 },
}

impl Default for CompressionMethod {
    fn default() -> Self {
        Self::Zstd { level: 3 }
    }
}

/// Compress data using the configured method
#[must_use = "compression result should be used"]
pub fn compress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Gzip { level } => {
            use std::io::Write;
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(level));
            encoder
                .write_all(data)
                .map_err(|e| KubeError::Compression(e.to_string()))?;
            encoder
                .finish()
                .map_err(|e| KubeError::Compression(e.to_string()))
        }
        CompressionMethod::Zstd { level } => zstd::encode_all(std::io::Cursor::new(data), level)
            .map_err(|e| KubeError::Compression(e.to_string())),
    }
}

/// Decompress data
#[must_use = "decompression result should be used"]
pub fn decompress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Gzip { .. } => {
            use std::io::Read;
            let mut decoder = flate2::read::GzDecoder::new(data);
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| KubeError::Compression(e.to_string()))?;
            Ok(decompressed)
        }
        CompressionMethod::Zstd { .. } => zstd::decode_all(std::io::Cursor::new(data))
            .map_err(|e| KubeError::Compression(e.to_string())),
    }
}

/// Serialize a release to JSON bytes
#[must_use = "serialization result should be used"]
pub fn serialize_release(release: &Release) -> Result<Vec<u8>> {
    serde_json::to_vec(release).map_err(|e| KubeError::Serialization(e.to_string()))
}

/// Deserialize a release from JSON bytes
#[must_use = "deserialization result should be used"]
pub fn deserialize_release(data: &[u8]) -> Result<Release> {
    serde_json::from_slice(data).map_err(|e| KubeError::Serialization(e.to_string()))
}

/// Namespace-scoped release store with a history retention cap
pub struct ReleaseStore<S: StorageDriver> {
    driver: S,
    namespace: String,
    /// Maximum revisions kept per release (0 = unlimited)
    max_history: u32,
}

impl<S: StorageDriver> ReleaseStore<S> {
    /// Create a store over `driver` for releases in `namespace`
    pub fn new(driver: S, namespace: impl Into<String>) -> Self {
        Self {
            driver,
            namespace: namespace.into(),
            max_history: 0,
        }
    }

    /// Namespace this store is scoped to
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Get the underlying driver
    pub fn driver(&self) -> &S {
        &self.driver
    }

    /// Current retention cap
    pub fn max_history(&self) -> u32 {
        self.max_history
    }

    /// Set the retention cap applied on `create`
    pub fn set_max_history(&mut self, max_history: u32) {
        self.max_history = max_history;
    }

    /// Get a release revision
    pub async fn get(&self, name: &str, revision: u32) -> Result<Release> {
        tracing::debug!(release = name, revision, "getting release");
        self.driver
            .get(&self.namespace, name, revision)
            .await
            .map_err(|e| match e {
                KubeError::ReleaseNotFound { name, namespace, .. } => KubeError::ReleaseNotFound {
                    name,
                    namespace,
                    revision: Some(revision),
                },
                other => other,
            })
    }

    /// Get the latest revision of a release
    pub async fn last(&self, name: &str) -> Result<Release> {
        tracing::debug!(release = name, "getting last revision");
        self.driver.get_latest(&self.namespace, name).await
    }

    /// All revisions of a release, newest first
    pub async fn history(&self, name: &str) -> Result<Vec<Release>> {
        self.driver.history(&self.namespace, name).await
    }

    /// Every revision currently `deployed`
    ///
    /// Returns [`KubeError::NoDeployedReleases`] when none is, which callers
    /// that only want to walk the list treat as empty.
    pub async fn deployed_all(&self, name: &str) -> Result<Vec<Release>> {
        let deployed: Vec<Release> = match self.history(name).await {
            Ok(history) => history
                .into_iter()
                .filter(|r| r.status == ReleaseStatus::Deployed)
                .collect(),
            Err(KubeError::ReleaseNotFound { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };

        if deployed.is_empty() {
            return Err(KubeError::NoDeployedReleases {
                name: name.to_string(),
            });
        }
        Ok(deployed)
    }

    /// Create a new revision, pruning old ones first when capped
    pub async fn create(&self, release: &Release) -> Result<()> {
        tracing::debug!(
            release = %release.name,
            revision = release.revision,
            "creating release"
        );
        if self.max_history > 0 {
            // Leave room for the revision about to be written
            if let Err(e) = self
                .remove_least_recent(&release.name, self.max_history - 1)
                .await
            {
                tracing::warn!("error pruning history for release {}: {}", release.name, e);
            }
        }
        self.driver.create(release).await
    }

    /// Update an existing revision
    pub async fn update(&self, release: &Release) -> Result<()> {
        tracing::debug!(
            release = %release.name,
            revision = release.revision,
            status = %release.status,
            "updating release"
        );
        self.driver.update(release).await
    }

    /// Delete the oldest revisions until at most `keep` remain
    ///
    /// The latest deployed revision is never deleted.
    async fn remove_least_recent(&self, name: &str, keep: u32) -> Result<()> {
        let mut history = match self.history(name).await {
            Ok(history) => history,
            Err(KubeError::ReleaseNotFound { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };
        if history.len() <= keep as usize {
            return Ok(());
        }

        history.sort_by_key(|r| r.revision);
        let last_deployed = history
            .iter()
            .rev()
            .find(|r| r.status == ReleaseStatus::Deployed)
            .map(|r| r.revision);

        let mut remaining = history.len();
        let mut errors = Vec::new();
        for release in &history {
            if remaining <= keep as usize {
                break;
            }
            if Some(release.revision) == last_deployed {
                continue;
            }
            match self
                .driver
                .delete(&self.namespace, name, release.revision)
                .await
            {
                Ok(_) => {
                    tracing::debug!(release = name, revision = release.revision, "pruned revision");
                    remaining -= 1;
                }
                Err(e) => errors.push(format!("revision {}: {}", release.revision, e)),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(KubeError::Storage(errors.join("; ")))
        }
    }
}

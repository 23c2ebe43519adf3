//! File-based storage driver
//!
//! Layout: `<base>/<namespace>/<name>/v<revision>.json`, each file holding one
//! release serialized as JSON and compressed with the configured method.
//! Used by the CLI so history survives between invocations without a cluster.

use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rewind_core::Release;

use super::{
    StorageConfig, StorageDriver, compress, decompress, deserialize_release, serialize_release,
};
use crate::error::{KubeError, Result};

/// File-based storage driver
#[derive(Debug, Clone)]
pub struct FileDriver {
    base_dir: PathBuf,
    config: StorageConfig,
}

impl FileDriver {
    /// Create a driver rooted at `base_dir`, creating the directory if needed
    pub fn new(base_dir: impl Into<PathBuf>, config: StorageConfig) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir, config })
    }

    /// Root directory of the store
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn release_dir(&self, namespace: &str, name: &str) -> PathBuf {
        self.base_dir.join(namespace).join(name)
    }

    fn revision_path(&self, namespace: &str, name: &str, revision: u32) -> PathBuf {
        self.release_dir(namespace, name)
            .join(format!("v{}.json", revision))
    }

    fn encode(&self, release: &Release) -> Result<Vec<u8>> {
        let json = serialize_release(release)?;
        compress(&json, self.config.compression)
    }

    fn write(&self, release: &Release) -> Result<()> {
        let data = self.encode(release)?;
        std::fs::write(
            self.revision_path(&release.namespace, &release.name, release.revision),
            data,
        )?;
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Release> {
        let data = std::fs::read(path)?;
        let json = decompress(&data, self.config.compression)?;
        deserialize_release(&json)
    }

    /// All readable revisions under a release directory, newest first
    ///
    /// Files that fail to decode are skipped with a warning.
    fn read_dir_releases(&self, dir: &Path) -> Result<Vec<Release>> {
        let mut releases = Vec::new();
        for path in child_paths(dir, |p| p.extension().is_some_and(|e| e == "json"))? {
            match self.read(&path) {
                Ok(release) => releases.push(release),
                Err(e) => tracing::warn!(path = %path.display(), "skipping unreadable release: {}", e),
            }
        }
        releases.sort_by(|a, b| b.revision.cmp(&a.revision));
        Ok(releases)
    }

    /// Remove `dir` if it is empty; failures are ignored
    fn prune_empty_dir(dir: &Path) {
        let empty = std::fs::read_dir(dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if empty {
            let _ = std::fs::remove_dir(dir);
        }
    }
}

/// Child paths of `dir` passing `filter`; a missing directory yields nothing
fn child_paths(dir: &Path, filter: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    Ok(std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| filter(p))
        .collect())
}

fn not_found(namespace: &str, name: &str, revision: Option<u32>) -> KubeError {
    KubeError::ReleaseNotFound {
        name: name.to_string(),
        namespace: namespace.to_string(),
        revision,
    }
}

#[async_trait]
impl StorageDriver for FileDriver {
    async fn get(&self, namespace: &str, name: &str, revision: u32) -> Result<Release> {
        let path = self.revision_path(namespace, name, revision);
        if !path.exists() {
            return Err(not_found(namespace, name, Some(revision)));
        }
        self.read(&path)
    }

    async fn get_latest(&self, namespace: &str, name: &str) -> Result<Release> {
        self.history(namespace, name)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(namespace, name, None))
    }

    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<Release>> {
        let releases = self.read_dir_releases(&self.release_dir(namespace, name))?;
        if releases.is_empty() {
            return Err(not_found(namespace, name, None));
        }
        Ok(releases)
    }

    async fn create(&self, release: &Release) -> Result<()> {
        std::fs::create_dir_all(self.release_dir(&release.namespace, &release.name))?;
        let data = self.encode(release)?;

        let path = self.revision_path(&release.namespace, &release.name, release.revision);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(KubeError::ReleaseAlreadyExists {
                    name: release.name.clone(),
                    namespace: release.namespace.clone(),
                    revision: release.revision,
                });
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&data)?;
        Ok(())
    }

    async fn update(&self, release: &Release) -> Result<()> {
        let path = self.revision_path(&release.namespace, &release.name, release.revision);
        if !path.exists() {
            return Err(not_found(
                &release.namespace,
                &release.name,
                Some(release.revision),
            ));
        }
        self.write(release)
    }

    async fn delete(&self, namespace: &str, name: &str, revision: u32) -> Result<Release> {
        let release = self.get(namespace, name, revision).await?;
        std::fs::remove_file(self.revision_path(namespace, name, revision))?;

        Self::prune_empty_dir(&self.release_dir(namespace, name));
        Self::prune_empty_dir(&self.base_dir.join(namespace));

        Ok(release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CompressionMethod;
    use rewind_core::{ChartRef, ReleaseStatus, Values};
    use tempfile::TempDir;

    fn test_release(name: &str, revision: u32) -> Release {
        let mut release = Release::new(
            name,
            "default",
            ChartRef::new("test-chart", semver::Version::new(1, 0, 0)),
            Values::new(),
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm",
        );
        release.revision = revision;
        release.status = ReleaseStatus::Deployed;
        release
    }

    fn driver(tmp: &TempDir) -> FileDriver {
        FileDriver::new(tmp.path(), StorageConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_file_driver_create_and_get() {
        let tmp = TempDir::new().unwrap();
        let driver = driver(&tmp);

        let release = test_release("myapp", 1);
        driver.create(&release).await.unwrap();

        assert!(tmp.path().join("default/myapp/v1.json").exists());
        let retrieved = driver.get("default", "myapp", 1).await.unwrap();
        assert_eq!(retrieved, release);
    }

    #[tokio::test]
    async fn test_file_driver_uncompressed_is_plain_json() {
        let tmp = TempDir::new().unwrap();
        let driver = FileDriver::new(
            tmp.path(),
            StorageConfig {
                compression: CompressionMethod::None,
            },
        )
        .unwrap();

        driver.create(&test_release("myapp", 1)).await.unwrap();

        let raw = std::fs::read_to_string(tmp.path().join("default/myapp/v1.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["name"], "myapp");
        assert_eq!(json["status"], "deployed");
    }

    #[tokio::test]
    async fn test_file_driver_create_existing_fails() {
        let tmp = TempDir::new().unwrap();
        let driver = driver(&tmp);

        driver.create(&test_release("myapp", 1)).await.unwrap();
        let result = driver.create(&test_release("myapp", 1)).await;
        assert!(matches!(
            result,
            Err(KubeError::ReleaseAlreadyExists { revision: 1, .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_driver_concurrent_create_has_one_winner() {
        let tmp = TempDir::new().unwrap();
        let driver = driver(&tmp);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let driver = driver.clone();
                tokio::spawn(async move {
                    let mut release = test_release("myapp", 1);
                    release.description = format!("writer {}", i);
                    driver.create(&release).await.map(|_| release.description)
                })
            })
            .collect();

        let mut winners = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(description) => winners.push(description),
                Err(e) => assert!(matches!(e, KubeError::ReleaseAlreadyExists { .. })),
            }
        }

        assert_eq!(winners.len(), 1);
        let stored = driver.get("default", "myapp", 1).await.unwrap();
        assert_eq!(stored.description, winners[0]);
    }

    #[tokio::test]
    async fn test_file_driver_update() {
        let tmp = TempDir::new().unwrap();
        let driver = driver(&tmp);

        driver.create(&test_release("myapp", 1)).await.unwrap();
        let superseded = test_release("myapp", 1).superseded();
        driver.update(&superseded).await.unwrap();

        let stored = driver.get("default", "myapp", 1).await.unwrap();
        assert_eq!(stored.status, ReleaseStatus::Superseded);

        let missing = driver.update(&test_release("myapp", 9)).await;
        assert!(matches!(
            missing,
            Err(KubeError::ReleaseNotFound { revision: Some(9), .. })
        ));
    }

    #[tokio::test]
    async fn test_file_driver_history() {
        let tmp = TempDir::new().unwrap();
        let driver = driver(&tmp);

        for revision in [1, 2, 10] {
            driver
                .create(&test_release("myapp", revision))
                .await
                .unwrap();
        }

        let history = driver.history("default", "myapp").await.unwrap();
        let revisions: Vec<u32> = history.iter().map(|r| r.revision).collect();
        assert_eq!(revisions, vec![10, 2, 1]);

        let latest = driver.get_latest("default", "myapp").await.unwrap();
        assert_eq!(latest.revision, 10);
    }

    #[tokio::test]
    async fn test_file_driver_history_skips_corrupt_files() {
        let tmp = TempDir::new().unwrap();
        let driver = driver(&tmp);

        driver.create(&test_release("myapp", 1)).await.unwrap();
        std::fs::write(tmp.path().join("default/myapp/v2.json"), b"garbage").unwrap();

        let history = driver.history("default", "myapp").await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_file_driver_delete_cleans_directories() {
        let tmp = TempDir::new().unwrap();
        let driver = driver(&tmp);

        driver.create(&test_release("myapp", 1)).await.unwrap();
        let deleted = driver.delete("default", "myapp", 1).await.unwrap();
        assert_eq!(deleted.revision, 1);

        assert!(matches!(
            driver.get("default", "myapp", 1).await,
            Err(KubeError::ReleaseNotFound { .. })
        ));
        assert!(!tmp.path().join("default").exists());
    }
}

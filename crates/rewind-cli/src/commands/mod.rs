//! CLI commands

pub mod history;
pub mod rollback;
pub mod status;

use clap::ValueEnum;
use rewind_kube::{FileDriver, ReleaseStore, StorageConfig};
use std::path::PathBuf;

use crate::error::Result;

/// Output format shared by every command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Settings every command runs with
#[derive(Debug, Clone)]
pub struct Context {
    pub namespace: String,
    pub store_dir: PathBuf,
}

impl Context {
    pub fn new(namespace: impl Into<String>, store_dir: Option<PathBuf>) -> Self {
        Self {
            namespace: namespace.into(),
            store_dir: store_dir.unwrap_or_else(default_store_dir),
        }
    }

    /// Release store for the context namespace
    pub fn store(&self) -> Result<ReleaseStore<FileDriver>> {
        let driver = FileDriver::new(&self.store_dir, StorageConfig::default())?;
        Ok(ReleaseStore::new(driver, &self.namespace))
    }
}

/// `<data dir>/rewind/releases`, or `./rewind/releases` without a data dir
pub fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rewind")
        .join("releases")
}

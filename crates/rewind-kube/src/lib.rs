//! Rewind Kube - Kubernetes integration for rewind
//!
//! This crate provides:
//! - **Storage Drivers**: Persist release revisions locally or in memory
//! - **Cluster Access**: Build, apply, wait for and delete release objects
//! - **Hooks**: Run `pre-rollback` / `post-rollback` hooks through the cluster
//! - **Rollback**: The engine restoring an earlier revision as a new one

pub mod actions;
pub mod cluster;
pub mod error;
pub mod hooks;
pub mod rollback;
pub mod storage;

pub use actions::{DEFAULT_TIMEOUT, RollbackOptions};
pub use cluster::{
    ApplyFailure, CallCounts, ClusterClient, ClusterResult, KubeCluster, MockCluster, ObjectKey,
    ObjectSet, ResourceCategory, ResourceObject, UpdatedObject,
};
pub use error::{KubeError, ManifestSide, Result};
pub use hooks::{ClusterHookExecutor, HookCall, HookExecutor, MockHookExecutor, hooks_for_phase};
pub use rollback::{Executed, Rollback, RollbackFailure, RollbackReport, resolve_draft};
pub use storage::{
    CompressionMethod, FileDriver, MockStorageDriver, OperationCounts, ReleaseStore,
    StorageConfig, StorageDriver,
};

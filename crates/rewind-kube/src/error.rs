//! Error types for rewind-kube

use rewind_core::HookPhase;
use thiserror::Error;

/// Result type for rewind-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Which manifest of a rollback failed to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestSide {
    /// The manifest of the release being replaced
    Current,
    /// The manifest being restored
    Target,
}

impl std::fmt::Display for ManifestSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Current => write!(f, "current"),
            Self::Target => write!(f, "target"),
        }
    }
}

/// Errors that can occur during release and cluster operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Release name does not satisfy naming rules
    #[error("release name is invalid: {name}: {reason}")]
    InvalidReleaseName { name: String, reason: String },

    /// Negative revision requested
    #[error("invalid release revision {revision}: revisions must be >= 0")]
    InvalidRevision { revision: i64 },

    /// Release (or one of its revisions) not found
    #[error("{}", not_found_message(name, namespace, *revision))]
    ReleaseNotFound {
        name: String,
        namespace: String,
        revision: Option<u32>,
    },

    /// Release revision already exists
    #[error("release '{name}' revision {revision} already exists in namespace '{namespace}'")]
    ReleaseAlreadyExists {
        name: String,
        namespace: String,
        revision: u32,
    },

    /// No revision of the release is currently deployed
    #[error("release '{name}' has no deployed releases")]
    NoDeployedReleases { name: String },

    /// Cluster cannot be reached
    #[error("Kubernetes cluster unreachable: {0}")]
    ClusterUnreachable(String),

    /// Cluster client lacks an optional capability
    #[error("the cluster client doesn't support {capability}")]
    ClusterCapabilityMissing { capability: &'static str },

    /// Manifest could not be turned into cluster objects
    #[error(
        "release {name} revision {revision}: unable to build kubernetes objects from {side} release manifest: {message}"
    )]
    BuildManifest {
        name: String,
        revision: u32,
        side: ManifestSide,
        message: String,
    },

    /// Hook execution failed
    #[error("release {name} revision {revision}: hook '{hook_name}' failed during {phase}: {message}")]
    HookFailed {
        name: String,
        revision: u32,
        hook_name: String,
        phase: HookPhase,
        message: String,
    },

    /// Applying the restored manifest failed
    #[error("Rollback \"{name}\" failed: {source}")]
    ApplyFailed {
        name: String,
        revision: u32,
        #[source]
        source: Box<KubeError>,
    },

    /// Cleanup after a failed apply failed too; the apply error is kept
    #[error(
        "an error occurred while cleaning up resources. original rollback error: {apply}: unable to cleanup resources: {}",
        errors.join(", ")
    )]
    CleanupFailed {
        #[source]
        apply: Box<KubeError>,
        errors: Vec<String>,
    },

    /// Resources did not become ready
    #[error("release {name} failed: {source}")]
    WaitFailed {
        name: String,
        revision: u32,
        #[source]
        source: Box<KubeError>,
    },

    /// A request for a single object was rejected
    #[error("failed to {action} {object}: {source}")]
    ObjectFailed {
        action: &'static str,
        object: String,
        #[source]
        source: kube::Error,
    },

    /// A workload reached a state it will not recover from
    #[error("{resource} is not ready: {message}")]
    NotReady { resource: String, message: String },

    /// Storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Compression error
    #[error("compression error: {0}")]
    Compression(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Timeout
    #[error("operation timed out after {0}")]
    Timeout(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
}

fn not_found_message(name: &str, namespace: &str, revision: Option<u32>) -> String {
    match revision {
        Some(revision) => format!(
            "release '{}' revision {} not found in namespace '{}'",
            name, revision, namespace
        ),
        None => format!("release '{}' not found in namespace '{}'", name, namespace),
    }
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<rewind_core::CoreError> for KubeError {
    fn from(e: rewind_core::CoreError) -> Self {
        match e {
            rewind_core::CoreError::InvalidReleaseName { name, reason } => {
                KubeError::InvalidReleaseName { name, reason }
            }
            other => KubeError::Serialization(other.to_string()),
        }
    }
}

//! CLI error types with exit code handling
//!
//! Every failure of a command ends up as a [`CliError`], which knows the
//! process exit code and carries a hint for the user where one helps.

use miette::Diagnostic;
use rewind_core::MAX_RELEASE_NAME_LEN;
use rewind_kube::KubeError;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Invalid release name or revision
    #[error("Validation failed: {message}")]
    #[diagnostic(code(rewind::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Release or revision missing from the store
    #[error("{message}")]
    #[diagnostic(code(rewind::cli::not_found))]
    NotFound {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Cluster unreachable or missing a capability
    #[error("{message}")]
    #[diagnostic(code(rewind::cli::cluster))]
    Cluster {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// The rollback began and failed part way
    #[error("{message}")]
    #[diagnostic(code(rewind::cli::rollback))]
    RollbackFailed {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (store directory, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(rewind::cli::io))]
    Io { message: String },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(rewind::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::RollbackFailed { .. } => exit_codes::ROLLBACK_FAILED,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        let message = err.to_string();
        match err {
            KubeError::InvalidReleaseName { .. } => CliError::Validation {
                message,
                help: Some(format!(
                    "release names use lowercase alphanumerics, '-' and '.', start and end \
                     with an alphanumeric, and are at most {} characters",
                    MAX_RELEASE_NAME_LEN
                )),
            },
            KubeError::InvalidRevision { .. } => CliError::Validation {
                message,
                help: Some("use 0 for the previous revision".to_string()),
            },
            KubeError::ReleaseNotFound { ref name, .. } => CliError::NotFound {
                help: Some(format!("run `rewind history {}` to list revisions", name)),
                message,
            },
            KubeError::NoDeployedReleases { .. } => CliError::NotFound {
                message,
                help: None,
            },
            KubeError::ClusterUnreachable(_) | KubeError::Api(_) => CliError::Cluster {
                message,
                help: Some("check your kubeconfig and current context".to_string()),
            },
            KubeError::ClusterCapabilityMissing { .. } => CliError::Cluster {
                message,
                help: Some("retry without --server-dry-run".to_string()),
            },
            KubeError::ApplyFailed { ref name, .. }
            | KubeError::WaitFailed { ref name, .. } => CliError::RollbackFailed {
                help: Some(format!(
                    "the failed revision was recorded; run `rewind history {}`",
                    name
                )),
                message,
            },
            KubeError::CleanupFailed { .. } => CliError::RollbackFailed {
                message,
                help: Some("some created resources were left in the cluster".to_string()),
            },
            KubeError::BuildManifest { .. }
            | KubeError::HookFailed { .. }
            | KubeError::Timeout(_)
            | KubeError::ObjectFailed { .. }
            | KubeError::NotReady { .. } => CliError::RollbackFailed {
                message,
                help: None,
            },
            KubeError::Io(_) => CliError::Io { message },
            _ => CliError::Other { message },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Other {
            message: format!("failed to encode output: {}", err),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

//! Release types and the status state machine
//!
//! Releases are value snapshots: status transitions consume a snapshot and
//! return the next one, so two holders of a release never observe each
//! other's changes.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::hook::Hook;
use crate::values::Values;

/// One versioned deployment of a chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Release name
    pub name: String,

    /// Kubernetes namespace
    pub namespace: String,

    /// Revision number (1-indexed, contiguous per name)
    pub revision: u32,

    /// Chart the manifest was rendered from
    pub chart: ChartRef,

    /// Rendered input values
    #[serde(default)]
    pub config: Values,

    /// Rendered manifest (all Kubernetes resources)
    pub manifest: String,

    /// Hooks defined in this release
    #[serde(default)]
    pub hooks: Vec<Hook>,

    /// Current status
    pub status: ReleaseStatus,

    /// When the first revision of this release was deployed
    pub first_deployed: DateTime<Utc>,

    /// When this revision was deployed
    pub last_deployed: DateTime<Utc>,

    /// Human-readable description of the last transition
    #[serde(default)]
    pub description: String,

    /// Notes rendered with the chart (if present)
    #[serde(default)]
    pub notes: Option<String>,
}

impl Release {
    /// Create a first revision with `unknown` status
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        chart: ChartRef,
        config: Values,
        manifest: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            namespace: namespace.into(),
            revision: 1,
            chart,
            config,
            manifest: manifest.into(),
            hooks: Vec::new(),
            status: ReleaseStatus::Unknown,
            first_deployed: now,
            last_deployed: now,
            description: String::new(),
            notes: None,
        }
    }

    /// Draft the revision that restores `previous` on top of `current`
    ///
    /// Identity and history come from `current`; everything that was deployed
    /// (chart, values, manifest, hooks, notes) comes from `previous`.
    pub fn for_rollback(current: &Release, previous: &Release) -> Self {
        Self {
            name: current.name.clone(),
            namespace: current.namespace.clone(),
            revision: current.revision + 1,
            chart: previous.chart.clone(),
            config: previous.config.clone(),
            manifest: previous.manifest.clone(),
            hooks: previous.hooks.clone(),
            status: ReleaseStatus::PendingRollback,
            first_deployed: current.first_deployed,
            last_deployed: Utc::now(),
            description: format!("Rollback to {}", previous.revision),
            notes: previous.notes.clone(),
        }
    }

    /// Transition to `deployed`
    #[must_use = "transitions return the next snapshot"]
    pub fn deployed(self) -> Self {
        Self {
            status: ReleaseStatus::Deployed,
            ..self
        }
    }

    /// Transition to `superseded` (replaced by a newer revision)
    #[must_use = "transitions return the next snapshot"]
    pub fn superseded(self) -> Self {
        Self {
            status: ReleaseStatus::Superseded,
            ..self
        }
    }

    /// Transition to `failed`, replacing the description
    #[must_use = "transitions return the next snapshot"]
    pub fn failed(self, description: impl Into<String>) -> Self {
        Self {
            status: ReleaseStatus::Failed,
            description: description.into(),
            ..self
        }
    }
}

/// Chart a release was rendered from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRef {
    /// Chart name
    pub name: String,

    /// Chart version (SemVer)
    pub version: Version,

    /// Application version
    #[serde(default)]
    pub app_version: Option<String>,
}

impl ChartRef {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            app_version: None,
        }
    }
}

impl std::fmt::Display for ChartRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// Release status
///
/// Note: This enum is non-exhaustive - new variants may be added in future versions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum ReleaseStatus {
    #[default]
    Unknown,
    Deployed,
    Uninstalled,
    Superseded,
    Failed,
    Uninstalling,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
}

impl ReleaseStatus {
    /// Check if this is a pending (transitional) status
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::PendingInstall | Self::PendingUpgrade | Self::PendingRollback | Self::Uninstalling
        )
    }
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Deployed => "deployed",
            Self::Uninstalled => "uninstalled",
            Self::Superseded => "superseded",
            Self::Failed => "failed",
            Self::Uninstalling => "uninstalling",
            Self::PendingInstall => "pending-install",
            Self::PendingUpgrade => "pending-upgrade",
            Self::PendingRollback => "pending-rollback",
        };
        write!(f, "{}", s)
    }
}

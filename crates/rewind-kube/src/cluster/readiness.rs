//! Readiness evaluation for workloads
//!
//! Each check inspects one object as returned by the API server. Polling and
//! timeouts live in the cluster client; these functions only decide.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;

/// Readiness of one object at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Still converging; the message says what is missing
    Pending(String),
    /// Will not become ready without intervention
    Failed(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// A Deployment is ready when every desired replica is updated, ready and available
///
/// A `Progressing=False` condition with reason `ProgressDeadlineExceeded` is a failure.
pub fn deployment(deployment: &Deployment) -> Readiness {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let status = deployment.status.as_ref();
    let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
    let updated = status.and_then(|s| s.updated_replicas).unwrap_or(0);
    let available = status.and_then(|s| s.available_replicas).unwrap_or(0);

    let stalled = status
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| {
            conditions.iter().find(|c| {
                c.type_ == "Progressing"
                    && c.status == "False"
                    && c.reason.as_deref() == Some("ProgressDeadlineExceeded")
            })
        });
    if let Some(condition) = stalled {
        return Readiness::Failed(
            condition
                .message
                .clone()
                .unwrap_or_else(|| "progress deadline exceeded".to_string()),
        );
    }

    if ready >= desired && updated >= desired && available >= desired {
        Readiness::Ready
    } else {
        Readiness::Pending(format!(
            "{}/{} ready, {}/{} updated, {}/{} available",
            ready, desired, updated, desired, available, desired
        ))
    }
}

/// A StatefulSet is ready when all replicas are ready and the rollout reached the update revision
pub fn statefulset(sts: &StatefulSet) -> Readiness {
    let desired = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let status = sts.status.as_ref();
    let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
    let current_rev = status.and_then(|s| s.current_revision.as_ref());
    let update_rev = status.and_then(|s| s.update_revision.as_ref());
    let rolled_out = update_rev.is_none() || current_rev == update_rev;

    if ready >= desired && rolled_out {
        Readiness::Ready
    } else {
        Readiness::Pending(format!(
            "{}/{} ready, rollout complete: {}",
            ready, desired, rolled_out
        ))
    }
}

/// A DaemonSet is ready when every scheduled pod is updated and ready
pub fn daemonset(ds: &DaemonSet) -> Readiness {
    let status = ds.status.as_ref();
    let desired = status.map(|s| s.desired_number_scheduled).unwrap_or(0);
    let ready = status.map(|s| s.number_ready).unwrap_or(0);
    let updated = status
        .and_then(|s| s.updated_number_scheduled)
        .unwrap_or(0);

    if ready >= desired && updated >= desired {
        Readiness::Ready
    } else {
        Readiness::Pending(format!(
            "{}/{} ready, {}/{} updated",
            ready, desired, updated, desired
        ))
    }
}

/// A Job is ready once it succeeded and failed once it gave up
pub fn job(job: &Job) -> Readiness {
    let status = job.status.as_ref();
    let succeeded = status.and_then(|s| s.succeeded).unwrap_or(0);
    let failed = status.and_then(|s| s.failed).unwrap_or(0);
    let active = status.and_then(|s| s.active).unwrap_or(0);

    let failed_condition = status
        .and_then(|s| s.conditions.as_ref())
        .and_then(|c| c.iter().find(|c| c.type_ == "Failed" && c.status == "True"));
    if let Some(condition) = failed_condition {
        return Readiness::Failed(
            condition
                .message
                .clone()
                .unwrap_or_else(|| format!("job failed with {} failures", failed)),
        );
    }

    if succeeded > 0 {
        Readiness::Ready
    } else if failed > 0 && active == 0 {
        Readiness::Failed(format!("job failed with {} failures", failed))
    } else {
        Readiness::Pending(format!("{} active, {} succeeded", active, succeeded))
    }
}

//! # Workload Readiness
//!
//! Readiness rules for controllers that manage pods.

use super::ReadinessError;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;

/// Ready once the latest generation is observed and every replica is ready
#[must_use]
pub fn deployment_is_ready(deployment: &Deployment) -> bool {
    let Some(status) = deployment.status.as_ref() else {
        return false;
    };
    if deployment.metadata.generation != status.observed_generation {
        return false;
    }
    status.ready_replicas.unwrap_or(0) == status.replicas.unwrap_or(0)
}

/// Ready once the latest generation is observed and the rollout has settled.
///
/// Replicas below the rolling-update partition are not expected to update,
/// so only `replicas - partition` must report as updated.
#[must_use]
pub fn stateful_set_is_ready(stateful_set: &StatefulSet) -> bool {
    let Some(status) = stateful_set.status.as_ref() else {
        return false;
    };
    if stateful_set.metadata.generation != status.observed_generation {
        return false;
    }
    let Some(spec) = stateful_set.spec.as_ref() else {
        return false;
    };
    let Some(replicas) = spec.replicas else {
        return false;
    };

    let partition = spec
        .update_strategy
        .as_ref()
        .and_then(|s| s.rolling_update.as_ref())
        .and_then(|r| r.partition)
        .filter(|p| *p > 0)
        .unwrap_or(0);

    let not_updated = (replicas - partition).max(0) - status.updated_replicas.unwrap_or(0);
    if not_updated > 0 {
        return false;
    }

    let not_ready = replicas - status.ready_replicas.unwrap_or(0);
    if not_ready > 0 {
        return false;
    }

    let not_deleted = status.replicas - replicas;
    not_deleted <= 0
}

/// Ready when every scheduled pod is ready and none is unavailable
#[must_use]
pub fn daemon_set_is_ready(daemon_set: &DaemonSet) -> bool {
    let Some(status) = daemon_set.status.as_ref() else {
        return false;
    };
    status.desired_number_scheduled == status.number_ready
        && status.number_ready > 0
        && status.number_unavailable.unwrap_or(0) < 1
}

/// Ready once the Job has finished with exactly one successful pod.
///
/// Success is counted against a single completion whatever
/// `spec.completions` asks for, so a finished multi-completion Job is a
/// reported failure, not a pending state.
pub fn job_is_ready(job: &Job) -> Result<bool, ReadinessError> {
    let Some(status) = job.status.as_ref() else {
        return Ok(false);
    };
    if status.active.unwrap_or(0) > 0 || status.completion_time.is_none() {
        return Ok(false);
    }

    if status.succeeded.unwrap_or(0) != 1 {
        return Err(ReadinessError::JobFailed {
            name: job.metadata.name.clone().unwrap_or_default(),
        });
    }

    Ok(true)
}

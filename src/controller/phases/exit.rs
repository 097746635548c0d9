//! # Phase Exit
//!
//! Turns phase outcomes into persisted conditions.
//!
//! Optimistic-lock conflicts are expected whenever something else writes the
//! component or a child between our read and our write. They are absorbed at
//! every phase boundary; the next pass re-derives state from the cluster.

use super::{PhaseKind, ResourcePhaseKind};
use crate::backend::BackendError;
use crate::constants;
use crate::controller::readiness::ReadinessError;
use crate::controller::reconciler::{ComponentReconciler, ReconcileOutcome};
use crate::crd::{PhaseCondition, PhaseState, Resource, ResourceCondition};
use crate::observability;
use tracing::debug;

/// Decision taken when a phase exits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseExit {
    pub outcome: ReconcileOutcome,
    pub proceed: bool,
}

/// True when some cause in the chain is a rejected conditional write
#[must_use]
pub fn is_optimistic_lock_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(backend) = cause.downcast_ref::<BackendError>() {
            return backend.is_conflict();
        }
        matches!(
            cause.downcast_ref::<ReadinessError>(),
            Some(ReadinessError::Backend(backend)) if backend.is_conflict()
        )
    })
}

#[must_use]
pub fn complete_condition(phase: PhaseKind) -> PhaseCondition {
    PhaseCondition {
        phase: phase.name().to_string(),
        state: PhaseState::Complete,
        message: constants::MSG_PHASE_COMPLETE.to_string(),
        last_modified: None,
    }
}

#[must_use]
pub fn pending_condition(phase: PhaseKind) -> PhaseCondition {
    PhaseCondition {
        phase: phase.name().to_string(),
        state: PhaseState::Pending,
        message: constants::MSG_PHASE_PENDING.to_string(),
        last_modified: None,
    }
}

#[must_use]
pub fn failed_condition(phase: PhaseKind, err: &anyhow::Error) -> PhaseCondition {
    PhaseCondition {
        phase: phase.name().to_string(),
        state: PhaseState::Failed,
        message: format!("{}{err:#}", constants::MSG_PHASE_FAILED_PREFIX),
        last_modified: None,
    }
}

/// Record the outcome of a component phase and decide how the pass continues.
///
/// | phase result      | condition | proceed | returned            |
/// |-------------------|-----------|---------|---------------------|
/// | `Ok(true)`        | Complete  | yes     | `Done`              |
/// | `Ok(false)`       | Pending   | no      | phase requeue       |
/// | conflict          | Complete  | no      | phase requeue       |
/// | any other error   | Failed    | no      | the error           |
///
/// A conflict therefore requeues the component rather than ending the pass
/// with no requeue. Every exit that does not proceed sets `ready` to false.
///
/// The condition is always persisted. A conflict on that write is absorbed;
/// any other write failure is returned, merged with the phase error if any.
pub async fn handle_phase_exit<R: ComponentReconciler>(
    reconciler: &mut R,
    phase: PhaseKind,
    result: anyhow::Result<bool>,
) -> anyhow::Result<PhaseExit> {
    let (condition, proceed, mut phase_error) = match result {
        Ok(true) => (complete_condition(phase), true, None),
        Ok(false) => (pending_condition(phase), false, None),
        Err(err) if is_optimistic_lock_error(&err) => {
            debug!(parent: reconciler.logger(), phase = %phase, error = %err, "optimistic lock conflict; retrying on next pass");
            observability::increment_optimistic_lock_conflicts();
            (complete_condition(phase), false, None)
        }
        Err(err) => (failed_condition(phase, &err), false, Some(err)),
    };
    observability::increment_phase_outcome(phase.name(), condition.state.as_str());

    if !proceed {
        reconciler.set_ready_status(false);
    }

    if let Err(update_error) = update_phase_condition(reconciler, condition).await {
        if update_error.is_conflict() {
            observability::increment_optimistic_lock_conflicts();
        } else {
            phase_error = Some(match phase_error {
                Some(err) => anyhow::anyhow!(
                    "failed to update status conditions; {update_error}; {err:#}"
                ),
                None => anyhow::Error::new(update_error),
            });
        }
    }

    if let Some(err) = phase_error {
        return Err(err);
    }

    Ok(PhaseExit {
        outcome: if proceed {
            ReconcileOutcome::Done
        } else {
            phase.default_requeue()
        },
        proceed,
    })
}

/// Record the outcome of a resource phase for one child.
///
/// Returns whether the remaining resource phases may run. Conflicts are
/// absorbed; other errors are recorded in the child's condition message and
/// returned.
pub async fn handle_resource_phase_exit<R: ComponentReconciler>(
    reconciler: &mut R,
    resource: Resource,
    phase: ResourcePhaseKind,
    result: anyhow::Result<bool>,
) -> anyhow::Result<bool> {
    let Resource {
        identity,
        mut condition,
    } = resource;

    let (proceed, mut phase_error) = match result {
        Ok(proceed) => (proceed, None),
        Err(err) if is_optimistic_lock_error(&err) => {
            debug!(parent: reconciler.logger(), resource = %identity, phase = %phase, "optimistic lock conflict on child");
            observability::increment_optimistic_lock_conflicts();
            (false, None)
        }
        Err(err) => (false, Some(err)),
    };

    if let Some(err) = &phase_error {
        condition.message = format!("unable to proceed with resource creation; phase {phase} failed: {err:#}");
    } else if !proceed {
        condition.message = format!("unable to proceed with resource creation; phase {phase} is not ready");
    }

    if let Err(update_error) =
        update_resource_condition(reconciler, Resource::new(identity, condition)).await
    {
        if update_error.is_conflict() {
            observability::increment_optimistic_lock_conflicts();
        } else {
            phase_error = Some(match phase_error {
                Some(err) => anyhow::anyhow!(
                    "failed to update resource conditions; {update_error}; {err:#}"
                ),
                None => anyhow::Error::new(update_error),
            });
        }
    }

    match phase_error {
        Some(err) => Err(err),
        None => Ok(proceed),
    }
}

/// Set a phase condition on the component and persist its status
pub async fn update_phase_condition<R: ComponentReconciler>(
    reconciler: &mut R,
    condition: PhaseCondition,
) -> Result<(), BackendError> {
    reconciler.set_phase_condition(condition);
    reconciler.update_status().await
}

/// Set a child's entry in the component status and persist it
pub async fn update_resource_condition<R: ComponentReconciler>(
    reconciler: &mut R,
    resource: Resource,
) -> Result<(), BackendError> {
    reconciler.set_resource(resource);
    reconciler.update_status().await
}

/// Condition recorded once a child has been persisted
#[must_use]
pub fn persisted_condition() -> ResourceCondition {
    ResourceCondition {
        last_resource_phase: ResourcePhaseKind::PersistResource.name().to_string(),
        last_modified: None,
        message: constants::MSG_RESOURCE_CREATED.to_string(),
        created: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_conflict_detected_through_context() {
        let err = Err::<(), _>(BackendError::Conflict("webstores/sample".to_string()))
            .context("updating status")
            .unwrap_err();
        assert!(is_optimistic_lock_error(&err));
    }

    #[test]
    fn test_conflict_detected_inside_readiness_error() {
        let err = anyhow::Error::new(ReadinessError::Backend(BackendError::Conflict(
            "deployments/web".to_string(),
        )));
        assert!(is_optimistic_lock_error(&err));
    }

    #[test]
    fn test_other_errors_are_not_conflicts() {
        let not_found = anyhow::Error::new(BackendError::NotFound("web".to_string()));
        let job = anyhow::Error::new(ReadinessError::JobFailed {
            name: "migrate".to_string(),
        });
        let message = anyhow::anyhow!("the object has been modified elsewhere");

        assert!(!is_optimistic_lock_error(&not_found));
        assert!(!is_optimistic_lock_error(&job));
        assert!(!is_optimistic_lock_error(&message));
    }

    #[test]
    fn test_failed_condition_embeds_error() {
        let err = anyhow::anyhow!("job migrate was not successful");
        let condition = failed_condition(PhaseKind::CheckReady, &err);
        assert_eq!(condition.state, PhaseState::Failed);
        assert_eq!(
            condition.message,
            "Failed Phase with Error; job migrate was not successful"
        );
        assert_eq!(condition.phase, "CheckReadyPhase");
    }
}

//! # Resource Phases
//!
//! WaitForResource then PersistResource, for one child at a time.

use super::exit::{handle_resource_phase_exit, persisted_condition, update_resource_condition};
use super::{ResourcePhaseKind, RESOURCE_PHASES};
use crate::backend::identity_of;
use crate::controller::reconciler::ComponentReconciler;
use crate::crd::{Component, Resource, ResourceIdentity};
use crate::observability;
use kube::api::DynamicObject;
use tracing::{info, trace};

/// Drive one child through the resource phases.
///
/// Stops at the first phase that does not proceed or fails; that outcome is
/// recorded on the child's status entry and returned.
pub async fn run_resource_phases<R: ComponentReconciler>(
    reconciler: &mut R,
    object: &DynamicObject,
) -> anyhow::Result<bool> {
    let identity = identity_of(object)?;
    let mut condition = reconciler
        .component()
        .status()
        .and_then(|status| status.resource(&identity))
        .map(|resource| resource.condition.clone())
        .unwrap_or_default();

    for phase in RESOURCE_PHASES {
        trace!(parent: reconciler.logger(), resource = %identity, phase = %phase, "enter resource phase");
        let result = run_resource_phase(*phase, reconciler, &identity, object).await;

        if !matches!(result, Ok(true)) {
            let resource = Resource::new(identity.clone(), condition);
            return handle_resource_phase_exit(reconciler, resource, *phase, result).await;
        }

        condition.last_resource_phase = phase.name().to_string();
        trace!(parent: reconciler.logger(), resource = %identity, phase = %phase, "completed resource phase");
    }

    Ok(true)
}

async fn run_resource_phase<R: ComponentReconciler>(
    phase: ResourcePhaseKind,
    reconciler: &mut R,
    identity: &ResourceIdentity,
    object: &DynamicObject,
) -> anyhow::Result<bool> {
    match phase {
        ResourcePhaseKind::WaitForResource => wait_for_resource(reconciler, identity).await,
        ResourcePhaseKind::PersistResource => persist_resource(reconciler, identity, object).await,
    }
}

/// Namespace pre-check, then the reconciler's own wait hook
async fn wait_for_resource<R: ComponentReconciler>(
    reconciler: &R,
    identity: &ResourceIdentity,
) -> anyhow::Result<bool> {
    let namespace_ready = reconciler
        .readiness()
        .namespace_for_resource_is_ready(reconciler.client(), identity)
        .await?;
    if !namespace_ready {
        trace!(parent: reconciler.logger(), resource = %identity, "namespace not ready");
        return Ok(false);
    }

    reconciler.wait(identity).await
}

async fn persist_resource<R: ComponentReconciler>(
    reconciler: &mut R,
    identity: &ResourceIdentity,
    object: &DynamicObject,
) -> anyhow::Result<bool> {
    if let Err(err) = reconciler.create_or_update(object).await {
        if err.is_conflict() {
            trace!(parent: reconciler.logger(), resource = %identity, "conflict persisting child; retrying on next pass");
            return Ok(true);
        }
        info!(parent: reconciler.logger(), resource = %identity, error = %err, "unable to persist child resource");
        return Err(err.into());
    }

    observability::increment_child_resources_persisted(&identity.kind);
    update_resource_condition(reconciler, Resource::new(identity.clone(), persisted_condition()))
        .await?;
    Ok(true)
}

//! # Phases
//!
//! The component-level phase machine and the per-child resource phase machine.
//!
//! A reconcile pass runs the reconciler's phases in order. Each phase returns
//! whether the pass may proceed; its outcome is folded into a persisted
//! [`PhaseCondition`](crate::crd::PhaseCondition) by [`handle_phase_exit`]. The
//! first phase that does not proceed ends the pass with that phase's result.
//!
//! ## Module Structure
//!
//! - `component.rs` - PreFlight, CreateResources, CheckReady, Complete and Dependency
//! - `resource.rs` - WaitForResource and PersistResource for a single child
//! - `exit.rs` - Phase exit handling and condition persistence

mod component;
mod exit;
mod resource;

pub use exit::{
    complete_condition, failed_condition, handle_phase_exit, handle_resource_phase_exit,
    is_optimistic_lock_error, pending_condition, PhaseExit,
};
pub use resource::run_resource_phases;

use crate::controller::reconciler::{ComponentReconciler, ReconcileOutcome, ReconcilerError};
use tracing::{debug, trace};

/// Component-level phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    Dependency,
    PreFlight,
    CreateResources,
    CheckReady,
    Complete,
}

/// Phases run when a reconciler does not choose its own plan
pub const DEFAULT_PHASES: &[PhaseKind] = &[
    PhaseKind::PreFlight,
    PhaseKind::CreateResources,
    PhaseKind::CheckReady,
    PhaseKind::Complete,
];

/// Default plan with the dependency check in front
pub const DEPENDENCY_PHASES: &[PhaseKind] = &[
    PhaseKind::Dependency,
    PhaseKind::PreFlight,
    PhaseKind::CreateResources,
    PhaseKind::CheckReady,
    PhaseKind::Complete,
];

impl PhaseKind {
    /// Name recorded in the phase condition
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            PhaseKind::Dependency => "DependencyPhase",
            PhaseKind::PreFlight => "PreFlightPhase",
            PhaseKind::CreateResources => "CreateResourcesPhase",
            PhaseKind::CheckReady => "CheckReadyPhase",
            PhaseKind::Complete => "CompletePhase",
        }
    }

    /// Result used when the phase does not proceed
    #[must_use]
    pub fn default_requeue(&self) -> ReconcileOutcome {
        ReconcileOutcome::Requeue
    }
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-child phases, strictly in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourcePhaseKind {
    WaitForResource,
    PersistResource,
}

pub const RESOURCE_PHASES: &[ResourcePhaseKind] = &[
    ResourcePhaseKind::WaitForResource,
    ResourcePhaseKind::PersistResource,
];

impl ResourcePhaseKind {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ResourcePhaseKind::WaitForResource => "WaitForResourcePhase",
            ResourcePhaseKind::PersistResource => "PersistResourcePhase",
        }
    }
}

impl std::fmt::Display for ResourcePhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Run the reconciler's phases in order and decide what happens next.
///
/// Returns on the first phase that does not proceed. A phase error that is not
/// an optimistic-lock conflict is returned after its Failed condition has been
/// recorded. Cancellation is checked before every phase.
pub async fn execute_phases<R: ComponentReconciler>(
    reconciler: &mut R,
) -> Result<ReconcileOutcome, ReconcilerError> {
    let cancellation = reconciler.context().cancellation.clone();

    for kind in reconciler.phases() {
        if cancellation.is_cancelled() {
            debug!(parent: reconciler.logger(), phase = %kind, "reconcile cancelled before phase");
            return Err(ReconcilerError::Cancelled);
        }

        trace!(parent: reconciler.logger(), phase = %kind, "enter phase");
        let result = tokio::select! {
            biased;
            () = cancellation.cancelled() => return Err(ReconcilerError::Cancelled),
            result = component::run_phase(*kind, reconciler) => result,
        };

        let exit = handle_phase_exit(reconciler, *kind, result).await?;
        if !exit.proceed {
            debug!(parent: reconciler.logger(), phase = %kind, "not ready; requeuing phase");
            return Ok(exit.outcome);
        }
        debug!(parent: reconciler.logger(), phase = %kind, "completed phase");
    }

    Ok(ReconcileOutcome::Done)
}

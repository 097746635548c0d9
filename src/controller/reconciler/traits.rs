//! # Component Reconciler
//!
//! The capability set a component type implements to plug into the phase
//! engine. A reconciler is built fresh for every reconcile pass and owns the
//! component plus the request-scoped [`ReconcileContext`].
//!
//! Only construction of child objects is mandatory. Every hook has a default
//! that lets the pass proceed, and the persistence hooks default to the
//! create-or-update and conditional status write in [`super::persist`].

use crate::backend::{BackendError, ClusterBackend};
use crate::controller::phases::{PhaseKind, DEFAULT_PHASES};
use crate::controller::readiness::ReadinessRegistry;
use crate::controller::reconciler::persist;
use crate::controller::reconciler::types::ReconcileContext;
use crate::crd::{Component, PhaseCondition, Resource, ResourceIdentity};
use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use tracing::trace;

/// Result of the mutation hook for one constructed child
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Leave the child out of this pass
    Skip,
    /// Persist these objects in place of the constructed one
    Replace(Vec<DynamicObject>),
}

#[async_trait]
pub trait ComponentReconciler: Send + Sync + Sized + std::fmt::Debug + 'static {
    type Component: Component;

    /// Build the reconciler for one pass
    fn build(component: Self::Component, context: ReconcileContext) -> Self;

    fn component(&self) -> &Self::Component;

    fn component_mut(&mut self) -> &mut Self::Component;

    fn context(&self) -> &ReconcileContext;

    fn context_mut(&mut self) -> &mut ReconcileContext;

    /// Span every log line of this pass is recorded under
    fn logger(&self) -> &tracing::Span {
        &self.context().span
    }

    fn client(&self) -> &dyn ClusterBackend {
        self.context().backend.as_ref()
    }

    fn readiness(&self) -> &ReadinessRegistry {
        self.context().readiness.as_ref()
    }

    fn set_ready_status(&mut self, ready: bool) {
        self.component_mut().set_ready_status(ready);
    }

    fn set_dependency_status(&mut self, satisfied: bool) {
        self.component_mut().set_dependency_status(satisfied);
    }

    fn phase_conditions(&self) -> &[PhaseCondition] {
        self.component().phase_conditions()
    }

    fn set_phase_condition(&mut self, condition: PhaseCondition) {
        self.component_mut().set_phase_condition(condition);
    }

    fn resources(&self) -> &[Resource] {
        self.component().resources()
    }

    fn set_resource(&mut self, resource: Resource) {
        self.component_mut().set_resource(resource);
    }

    /// Children constructed during this pass
    fn child_resources(&self) -> &[DynamicObject] {
        &self.context().children
    }

    fn set_child_resources(&mut self, children: Vec<DynamicObject>) {
        self.context_mut().children = children;
    }

    /// Phases run for this component, in order
    fn phases(&self) -> &'static [PhaseKind] {
        DEFAULT_PHASES
    }

    /// Kinds of child the controller should watch for re-delivery
    fn child_kinds() -> Vec<GroupVersionKind>;

    /// Build every child object from the component's spec
    fn construct_resources(&self) -> anyhow::Result<Vec<DynamicObject>>;

    /// Adjust, skip or fan out a constructed child
    fn mutate(&self, object: DynamicObject) -> anyhow::Result<Mutation> {
        Ok(Mutation::Replace(vec![object]))
    }

    /// Component-specific wait before a child is persisted
    async fn wait(&self, _resource: &ResourceIdentity) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Predicate for the dependency phase
    async fn check_dependencies(&self) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Structural checks before any mutation
    async fn pre_flight(&self) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Data keys a ConfigMap or Secret child must carry, non-empty, before
    /// CheckReady passes. Other kinds ignore the result.
    fn expected_keys(&self, _identity: &ResourceIdentity) -> Vec<String> {
        Vec::new()
    }

    /// Component-specific readiness, checked after every child passes its probe
    async fn check_ready(&self) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Create the child or update the live copy, owned by the component
    async fn create_or_update(&self, object: &DynamicObject) -> Result<DynamicObject, BackendError> {
        persist::create_or_update(self.client(), self.component(), object).await
    }

    /// Write the component status if it differs from the last persisted one
    async fn update_status(&mut self) -> Result<(), BackendError> {
        if self.context().persisted_status.as_ref() == self.component().status() {
            trace!(parent: self.logger(), "status unchanged; skipping update");
            return Ok(());
        }
        let updated = persist::write_status(self.client(), self.component()).await?;
        let persisted = updated.status().cloned();
        *self.component_mut() = updated;
        self.context_mut().persisted_status = persisted;
        Ok(())
    }
}

//! # Component
//!
//! The capability every reconciled top-level object exposes to the phase
//! engine. Implementors only provide access to their status; the accessors
//! the engine uses are derived from it.

use crate::crd::status::{ComponentStatus, PhaseCondition, Resource, ResourceIdentity};
use kube::core::Resource as KubeResource;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A declarative object whose children are driven by the phase engine
pub trait Component:
    KubeResource<DynamicType = ()> + Clone + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Current status, if one has been written
    fn status(&self) -> Option<&ComponentStatus>;

    /// Mutable status, created on first access
    fn status_mut(&mut self) -> &mut ComponentStatus;

    fn ready_status(&self) -> bool {
        self.status().is_some_and(|s| s.ready)
    }

    fn set_ready_status(&mut self, ready: bool) {
        self.status_mut().ready = ready;
    }

    fn dependency_status(&self) -> bool {
        self.status().is_some_and(|s| s.dependencies_satisfied)
    }

    fn set_dependency_status(&mut self, satisfied: bool) {
        self.status_mut().dependencies_satisfied = satisfied;
    }

    fn phase_conditions(&self) -> &[PhaseCondition] {
        self.status().map_or(&[], |s| s.conditions.as_slice())
    }

    fn set_phase_condition(&mut self, condition: PhaseCondition) {
        self.status_mut().set_phase_condition(condition);
    }

    fn resources(&self) -> &[Resource] {
        self.status().map_or(&[], |s| s.resources.as_slice())
    }

    fn set_resource(&mut self, resource: Resource) {
        self.status_mut().set_resource(resource);
    }

    /// Identity of the component itself
    fn identity(&self) -> ResourceIdentity {
        let gvk = kube::core::GroupVersionKind::gvk(
            &Self::group(&()),
            &Self::version(&()),
            &Self::kind(&()),
        );
        ResourceIdentity::new(
            gvk.group,
            gvk.version,
            gvk.kind,
            self.namespace().unwrap_or_default(),
            self.name_any(),
        )
    }

    /// Key used for rate limiting and logging
    fn reconcile_key(&self) -> String {
        match self.namespace() {
            Some(namespace) => format!("{}/{}", namespace, self.name_any()),
            None => self.name_any(),
        }
    }
}

//! # Component Status
//!
//! Status types persisted on every component: per-phase conditions and the
//! per-child resource list. The engine only ever mutates this sub-document.

use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use serde::{Deserialize, Serialize};

/// Observed state of a component
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// True once every phase has completed for the current spec
    #[serde(default)]
    pub ready: bool,
    /// Result of the most recent dependency check
    #[serde(default)]
    pub dependencies_satisfied: bool,
    /// Generation observed by the last completed reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// One condition per phase name, most recent wins
    #[serde(default)]
    pub conditions: Vec<PhaseCondition>,
    /// One entry per child resource identity, most recent wins
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl ComponentStatus {
    /// Look up the condition recorded for a phase
    #[must_use]
    pub fn phase_condition(&self, phase: &str) -> Option<&PhaseCondition> {
        self.conditions.iter().find(|c| c.phase == phase)
    }

    /// Replace the condition for `condition.phase` in place, or append it.
    ///
    /// A condition whose state and message are unchanged keeps the previous
    /// `lastModified` so that steady-state reconciles write identical status.
    pub fn set_phase_condition(&mut self, mut condition: PhaseCondition) {
        match self
            .conditions
            .iter_mut()
            .find(|existing| existing.phase == condition.phase)
        {
            Some(existing) => {
                if condition.last_modified.is_none() {
                    condition.last_modified = if existing.state == condition.state
                        && existing.message == condition.message
                    {
                        existing.last_modified.clone()
                    } else {
                        Some(now_rfc3339())
                    };
                }
                *existing = condition;
            }
            None => {
                if condition.last_modified.is_none() {
                    condition.last_modified = Some(now_rfc3339());
                }
                self.conditions.push(condition);
            }
        }
    }

    /// Look up the status entry for a child resource
    #[must_use]
    pub fn resource(&self, identity: &ResourceIdentity) -> Option<&Resource> {
        self.resources.iter().find(|r| &r.identity == identity)
    }

    /// Replace the entry with the same group/version/kind/namespace/name, or append it
    pub fn set_resource(&mut self, mut resource: Resource) {
        match self
            .resources
            .iter_mut()
            .find(|existing| existing.identity == resource.identity)
        {
            Some(existing) => {
                if resource.condition.last_modified.is_none() {
                    resource.condition.last_modified = if existing.condition.same_outcome(&resource.condition) {
                        existing.condition.last_modified.clone()
                    } else {
                        Some(now_rfc3339())
                    };
                }
                *existing = resource;
            }
            None => {
                if resource.condition.last_modified.is_none() {
                    resource.condition.last_modified = Some(now_rfc3339());
                }
                self.resources.push(resource);
            }
        }
    }
}

/// Outcome of a single phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum PhaseState {
    Pending,
    Complete,
    Failed,
}

impl PhaseState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseState::Pending => "Pending",
            PhaseState::Complete => "Complete",
            PhaseState::Failed => "Failed",
        }
    }
}

/// Persisted record of the last outcome of a named phase
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PhaseCondition {
    /// Phase name, unique within the condition list
    pub phase: String,
    pub state: PhaseState,
    #[serde(default)]
    pub message: String,
    /// RFC3339 timestamp of the last change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

/// Identity of a child resource owned by a component
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentity {
    /// API group, empty for the core group
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
    pub name: String,
    /// Empty for cluster-scoped resources
    #[serde(default)]
    pub namespace: String,
}

impl ResourceIdentity {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Derive the identity of a dynamic object from its type and object metadata.
    ///
    /// Returns `None` when the object carries no `apiVersion`/`kind` or no name.
    #[must_use]
    pub fn from_object(object: &DynamicObject) -> Option<Self> {
        let types = object.types.as_ref()?;
        let (group, version) = split_api_version(&types.api_version);
        Some(Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: types.kind.clone(),
            name: object.metadata.name.clone()?,
            namespace: object.metadata.namespace.clone().unwrap_or_default(),
        })
    }

    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    #[must_use]
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }

    #[must_use]
    pub fn is_namespaced(&self) -> bool {
        !self.namespace.is_empty()
    }
}

impl std::fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{} {}", self.api_version(), self.kind, self.name)
        } else {
            write!(
                f,
                "{}/{} {}/{}",
                self.api_version(),
                self.kind,
                self.namespace,
                self.name
            )
        }
    }
}

/// Split `apiVersion` into group and version; the core group is empty
#[must_use]
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Condition of a single child resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCondition {
    /// Name of the last resource phase that completed for this child
    #[serde(default)]
    pub last_resource_phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub message: String,
    /// True once the child has been persisted to the cluster
    #[serde(default)]
    pub created: bool,
}

impl ResourceCondition {
    fn same_outcome(&self, other: &ResourceCondition) -> bool {
        self.last_resource_phase == other.last_resource_phase
            && self.message == other.message
            && self.created == other.created
    }
}

/// A child resource and its condition as stored on the component status
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(flatten)]
    pub identity: ResourceIdentity,
    #[serde(default)]
    pub condition: ResourceCondition,
}

impl Resource {
    #[must_use]
    pub fn new(identity: ResourceIdentity, condition: ResourceCondition) -> Self {
        Self {
            identity,
            condition,
        }
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

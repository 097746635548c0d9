//! # Readiness
//!
//! Kind-specific readiness probes and the registry that dispatches to them.
//!
//! A probe answers one question about a live object: has its observed state
//! caught up with what was asked of it? Absence is "not ready yet", never an
//! error. Only a terminal bad state (a Job that finished unsuccessfully) is
//! reported as an error.
//!
//! ## Module Structure
//!
//! - `document.rs` - Typed `ResourceDocument` decoded from a dynamic object
//! - `workloads.rs` - Deployment, StatefulSet, DaemonSet and Job rules
//! - `core_v1.rs` - Service, Namespace, ConfigMap and Secret rules
//! - `probes.rs` - Fetching probes registered by default

mod core_v1;
mod document;
mod probes;
mod workloads;

pub use core_v1::{config_map_is_ready, namespace_is_ready, secret_is_ready, service_is_ready};
pub use document::ResourceDocument;
pub use probes::{CustomResourceDefinitionProbe, KeyedDataProbe, ObservedStateProbe};
pub use workloads::{daemon_set_is_ready, deployment_is_ready, job_is_ready, stateful_set_is_ready};

use crate::backend::{BackendError, ClusterBackend};
use crate::crd::ResourceIdentity;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Errors reported by readiness probes
#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("job {name} was not successful")]
    JobFailed { name: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("unable to decode {kind} {name}: {source}")]
    Decode {
        kind: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Readiness check for one resource kind
#[async_trait]
pub trait ReadinessProbe: Send + Sync + std::fmt::Debug {
    /// Fetch the object named by `identity` and report whether it is ready
    async fn is_ready(
        &self,
        backend: &dyn ClusterBackend,
        identity: &ResourceIdentity,
    ) -> Result<bool, ReadinessError>;
}

/// Probes keyed by API group and kind
#[derive(Debug, Clone)]
pub struct ReadinessRegistry {
    probes: HashMap<String, Arc<dyn ReadinessProbe>>,
}

impl Default for ReadinessRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for (group, kind) in [
            ("apps", "Deployment"),
            ("apps", "StatefulSet"),
            ("apps", "DaemonSet"),
            ("batch", "Job"),
            ("", "Service"),
            ("", "Namespace"),
        ] {
            registry.register(group, kind, ObservedStateProbe);
        }
        registry.register("", "ConfigMap", KeyedDataProbe::default());
        registry.register("", "Secret", KeyedDataProbe::default());
        registry.register(
            "apiextensions.k8s.io",
            "CustomResourceDefinition",
            CustomResourceDefinitionProbe,
        );
        registry
    }
}

impl ReadinessRegistry {
    /// A registry with no probes; every kind reads as ready
    #[must_use]
    pub fn empty() -> Self {
        Self {
            probes: HashMap::new(),
        }
    }

    /// Register or replace the probe for a kind
    pub fn register(
        &mut self,
        group: &str,
        kind: &str,
        probe: impl ReadinessProbe + 'static,
    ) -> &mut Self {
        self.probes.insert(probe_key(group, kind), Arc::new(probe));
        self
    }

    #[must_use]
    pub fn has_probe(&self, group: &str, kind: &str) -> bool {
        self.probes.contains_key(&probe_key(group, kind))
    }

    /// Run the probe registered for the identity's kind; unregistered kinds are ready
    pub async fn is_ready(
        &self,
        backend: &dyn ClusterBackend,
        identity: &ResourceIdentity,
    ) -> Result<bool, ReadinessError> {
        match self.probes.get(&probe_key(&identity.group, &identity.kind)) {
            Some(probe) => probe.is_ready(backend, identity).await,
            None => {
                trace!(resource = %identity, "no readiness probe registered for kind");
                Ok(true)
            }
        }
    }

    /// Like [`is_ready`](Self::is_ready), but a ConfigMap or Secret must also
    /// carry every key in `expected_keys` with a non-empty value.
    pub async fn is_ready_with_keys(
        &self,
        backend: &dyn ClusterBackend,
        identity: &ResourceIdentity,
        expected_keys: &[String],
    ) -> Result<bool, ReadinessError> {
        let keyed = identity.group.is_empty()
            && matches!(identity.kind.as_str(), "ConfigMap" | "Secret");
        if keyed && !expected_keys.is_empty() {
            return KeyedDataProbe::new(expected_keys.iter().cloned())
                .is_ready(backend, identity)
                .await;
        }
        self.is_ready(backend, identity).await
    }

    /// Check the Namespace holding `identity`; cluster-scoped identities pass
    pub async fn namespace_for_resource_is_ready(
        &self,
        backend: &dyn ClusterBackend,
        identity: &ResourceIdentity,
    ) -> Result<bool, ReadinessError> {
        if !identity.is_namespaced() {
            return Ok(true);
        }
        let namespace = ResourceIdentity::new("", "v1", "Namespace", "", identity.namespace.clone());
        self.is_ready(backend, &namespace).await
    }
}

fn probe_key(group: &str, kind: &str) -> String {
    format!("{group}/{kind}")
}

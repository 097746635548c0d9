//! # Built-in Probes
//!
//! Probe implementations registered by default in the readiness registry.

use super::{ReadinessError, ReadinessProbe, ResourceDocument};
use crate::backend::ClusterBackend;
use crate::controller::readiness::core_v1::{config_map_is_ready, secret_is_ready};
use crate::crd::ResourceIdentity;
use async_trait::async_trait;
use tracing::debug;

/// Fetches the object and evaluates the rule for its kind
#[derive(Debug, Default, Clone, Copy)]
pub struct ObservedStateProbe;

#[async_trait]
impl ReadinessProbe for ObservedStateProbe {
    async fn is_ready(
        &self,
        backend: &dyn ClusterBackend,
        identity: &ResourceIdentity,
    ) -> Result<bool, ReadinessError> {
        let Some(object) = backend.get(identity).await? else {
            return Ok(false);
        };
        ResourceDocument::from_dynamic(&object)?.is_ready()
    }
}

/// ConfigMap or Secret probe requiring a set of non-empty data keys
#[derive(Debug, Default, Clone)]
pub struct KeyedDataProbe {
    expected_keys: Vec<String>,
}

impl KeyedDataProbe {
    pub fn new<I, S>(expected_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expected_keys: expected_keys.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn expected_keys(&self) -> &[String] {
        &self.expected_keys
    }
}

#[async_trait]
impl ReadinessProbe for KeyedDataProbe {
    async fn is_ready(
        &self,
        backend: &dyn ClusterBackend,
        identity: &ResourceIdentity,
    ) -> Result<bool, ReadinessError> {
        let Some(object) = backend.get(identity).await? else {
            return Ok(false);
        };
        Ok(match ResourceDocument::from_dynamic(&object)? {
            ResourceDocument::ConfigMap(config_map) => {
                config_map_is_ready(&config_map, &self.expected_keys)
            }
            ResourceDocument::Secret(secret) => secret_is_ready(&secret, &self.expected_keys),
            other => other.is_ready()?,
        })
    }
}

/// Ready once the definition can be fetched.
///
/// Every fetch failure reads as not ready, so a backend outage here shows up
/// as a Pending phase rather than a Failed one.
#[derive(Debug, Default, Clone, Copy)]
pub struct CustomResourceDefinitionProbe;

#[async_trait]
impl ReadinessProbe for CustomResourceDefinitionProbe {
    async fn is_ready(
        &self,
        backend: &dyn ClusterBackend,
        identity: &ResourceIdentity,
    ) -> Result<bool, ReadinessError> {
        match backend.get(identity).await {
            Ok(found) => Ok(found.is_some()),
            Err(e) => {
                debug!(resource = %identity, error = %e, "custom resource definition not fetchable");
                Ok(false)
            }
        }
    }
}

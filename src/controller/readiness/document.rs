//! # Resource Documents
//!
//! Typed view of a fetched object. Kinds with a readiness rule decode into
//! their k8s-openapi type; everything else stays dynamic.

use super::core_v1::{config_map_is_ready, namespace_is_ready, secret_is_ready, service_is_ready};
use super::workloads::{daemon_set_is_ready, deployment_is_ready, job_is_ready, stateful_set_is_ready};
use super::ReadinessError;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, Service};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::DynamicObject;
use serde::de::DeserializeOwned;

/// A fetched object, tagged by kind
#[derive(Debug, Clone)]
pub enum ResourceDocument {
    Deployment(Box<Deployment>),
    StatefulSet(Box<StatefulSet>),
    DaemonSet(Box<DaemonSet>),
    Job(Box<Job>),
    Service(Box<Service>),
    Namespace(Box<Namespace>),
    ConfigMap(Box<ConfigMap>),
    Secret(Box<Secret>),
    CustomResourceDefinition(Box<CustomResourceDefinition>),
    /// Any kind without a built-in readiness rule
    Other(Box<DynamicObject>),
}

impl ResourceDocument {
    /// Decode a dynamic object by its apiVersion group and kind
    pub fn from_dynamic(object: &DynamicObject) -> Result<Self, ReadinessError> {
        let (group, kind) = match &object.types {
            Some(types) => (
                crate::crd::split_api_version(&types.api_version).0,
                types.kind.as_str(),
            ),
            None => return Ok(Self::Other(Box::new(object.clone()))),
        };

        Ok(match (group, kind) {
            ("apps", "Deployment") => Self::Deployment(decode(object)?),
            ("apps", "StatefulSet") => Self::StatefulSet(decode(object)?),
            ("apps", "DaemonSet") => Self::DaemonSet(decode(object)?),
            ("batch", "Job") => Self::Job(decode(object)?),
            ("", "Service") => Self::Service(decode(object)?),
            ("", "Namespace") => Self::Namespace(decode(object)?),
            ("", "ConfigMap") => Self::ConfigMap(decode(object)?),
            ("", "Secret") => Self::Secret(decode(object)?),
            ("apiextensions.k8s.io", "CustomResourceDefinition") => {
                Self::CustomResourceDefinition(decode(object)?)
            }
            _ => Self::Other(Box::new(object.clone())),
        })
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Deployment(_) => "Deployment",
            Self::StatefulSet(_) => "StatefulSet",
            Self::DaemonSet(_) => "DaemonSet",
            Self::Job(_) => "Job",
            Self::Service(_) => "Service",
            Self::Namespace(_) => "Namespace",
            Self::ConfigMap(_) => "ConfigMap",
            Self::Secret(_) => "Secret",
            Self::CustomResourceDefinition(_) => "CustomResourceDefinition",
            Self::Other(object) => object.types.as_ref().map_or("", |t| t.kind.as_str()),
        }
    }

    /// Evaluate readiness of the observed state; kinds without a rule are ready
    pub fn is_ready(&self) -> Result<bool, ReadinessError> {
        match self {
            Self::Deployment(d) => Ok(deployment_is_ready(d)),
            Self::StatefulSet(s) => Ok(stateful_set_is_ready(s)),
            Self::DaemonSet(d) => Ok(daemon_set_is_ready(d)),
            Self::Job(j) => job_is_ready(j),
            Self::Service(s) => Ok(service_is_ready(s)),
            Self::Namespace(n) => Ok(namespace_is_ready(n)),
            Self::ConfigMap(c) => Ok(config_map_is_ready(c, &[])),
            Self::Secret(s) => Ok(secret_is_ready(s, &[])),
            Self::CustomResourceDefinition(_) | Self::Other(_) => Ok(true),
        }
    }
}

fn decode<T: DeserializeOwned>(object: &DynamicObject) -> Result<Box<T>, ReadinessError> {
    let name = object.metadata.name.clone().unwrap_or_default();
    let kind = object
        .types
        .as_ref()
        .map(|t| t.kind.clone())
        .unwrap_or_default();
    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .map(Box::new)
        .map_err(|source| ReadinessError::Decode { kind, name, source })
}

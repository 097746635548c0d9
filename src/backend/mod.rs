//! # Cluster Backend
//!
//! The remote object store the engine reconciles against. Objects cross this
//! boundary as `DynamicObject`s; typed callers convert with [`to_dynamic`] and
//! [`from_dynamic`].
//!
//! Writes are conditional: `update` and `update_status` carry the
//! resourceVersion the caller last observed and fail with
//! [`BackendError::Conflict`] when the stored object has moved on.
//!
//! ## Implementations
//!
//! - `api_server.rs` - a kube-rs client against a live API server
//! - `memory.rs` - an in-process store used by tests and dry runs

mod api_server;
mod memory;

pub use api_server::KubeBackend;
pub use memory::InMemoryBackend;

use crate::crd::ResourceIdentity;
use async_trait::async_trait;
use futures::stream::BoxStream;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors returned by a [`ClusterBackend`]
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("the object has been modified; please apply your changes to the latest version and try again: {0}")]
    Conflict(String),
    #[error("unknown resource kind {0}")]
    UnknownKind(String),
    #[error("invalid object: {0}")]
    InvalidObject(String),
    #[error("watch failed: {0}")]
    Watch(String),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackendError {
    /// True for a write rejected because the stored resourceVersion changed
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, BackendError::Conflict(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }
}

/// Filters applied to [`ClusterBackend::list`]
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Restrict to one namespace; `None` lists across namespaces
    pub namespace: Option<String>,
    /// Equality-based label selector, e.g. `app=webstore,tier=web`
    pub label_selector: Option<String>,
}

impl ListFilter {
    #[must_use]
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            label_selector: None,
        }
    }

    #[must_use]
    pub fn with_labels(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }
}

/// A change observed on a watched kind
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// Object created or modified
    Applied(DynamicObject),
    Deleted(DynamicObject),
}

impl WatchEvent {
    #[must_use]
    pub fn object(&self) -> &DynamicObject {
        match self {
            WatchEvent::Applied(object) | WatchEvent::Deleted(object) => object,
        }
    }
}

pub type WatchStream = BoxStream<'static, Result<WatchEvent, BackendError>>;

/// Capabilities the engine consumes from the cluster
#[async_trait]
pub trait ClusterBackend: Send + Sync + std::fmt::Debug {
    /// Fetch an object; `Ok(None)` when it does not exist
    async fn get(&self, identity: &ResourceIdentity) -> Result<Option<DynamicObject>, BackendError>;

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        filter: &ListFilter,
    ) -> Result<Vec<DynamicObject>, BackendError>;

    /// Create an object; fails with `AlreadyExists` when the name is taken
    async fn create(&self, object: &DynamicObject) -> Result<DynamicObject, BackendError>;

    /// Replace an object, conditional on `metadata.resourceVersion` when set
    async fn update(&self, object: &DynamicObject) -> Result<DynamicObject, BackendError>;

    /// Replace only the status sub-document, conditional on `metadata.resourceVersion`
    async fn update_status(&self, object: &DynamicObject) -> Result<DynamicObject, BackendError>;

    /// Stream changes to every object of a kind, optionally within one namespace.
    ///
    /// Only changes after the call are guaranteed; pair with `list` for the
    /// objects that already exist. A reconnect may replay current objects.
    async fn watch(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<WatchStream, BackendError>;
}

/// Convert a typed object into its dynamic form
pub fn to_dynamic<T: Serialize>(object: &T) -> Result<DynamicObject, BackendError> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

/// Convert a dynamic object into a typed one
pub fn from_dynamic<T: DeserializeOwned>(object: &DynamicObject) -> Result<T, BackendError> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

/// Identity of a dynamic object, or `InvalidObject` when it lacks type or name
pub fn identity_of(object: &DynamicObject) -> Result<ResourceIdentity, BackendError> {
    ResourceIdentity::from_object(object).ok_or_else(|| {
        BackendError::InvalidObject(format!(
            "object {:?} is missing apiVersion, kind or name",
            object.metadata.name
        ))
    })
}

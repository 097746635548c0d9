//! # Kubernetes Backend
//!
//! [`ClusterBackend`] over a kube-rs `Client`. Kinds are resolved through API
//! discovery once and cached for the lifetime of the backend.

use super::{identity_of, BackendError, ClusterBackend, ListFilter, WatchEvent, WatchStream};
use crate::constants::FIELD_MANAGER;
use crate::crd::ResourceIdentity;
use async_trait::async_trait;
use futures::StreamExt;
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::core::GroupVersionKind;
use kube::discovery::{ApiCapabilities, ApiResource, Scope};
use kube::Client;
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Backend talking to a live API server
pub struct KubeBackend {
    client: Client,
    kinds: Mutex<HashMap<GroupVersionKind, (ApiResource, ApiCapabilities)>>,
}

impl std::fmt::Debug for KubeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self.kinds.lock().map(|k| k.len()).unwrap_or_default();
        f.debug_struct("KubeBackend")
            .field("cached_kinds", &cached)
            .finish_non_exhaustive()
    }
}

impl KubeBackend {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            kinds: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Resolve a kind through discovery, caching the result
    pub async fn resolve(
        &self,
        gvk: &GroupVersionKind,
    ) -> Result<(ApiResource, ApiCapabilities), BackendError> {
        if let Some(found) = self.kinds.lock().ok().and_then(|k| k.get(gvk).cloned()) {
            return Ok(found);
        }

        let resolved = kube::discovery::pinned_kind(&self.client, gvk)
            .await
            .map_err(|e| match e {
                kube::Error::Api(ref ae) if ae.code == 404 => {
                    BackendError::UnknownKind(format!("{}/{} {}", gvk.group, gvk.version, gvk.kind))
                }
                kube::Error::Discovery(_) => {
                    BackendError::UnknownKind(format!("{}/{} {}", gvk.group, gvk.version, gvk.kind))
                }
                other => BackendError::Kube(other),
            })?;
        debug!(kind = %gvk.kind, group = %gvk.group, "resolved API resource");

        if let Ok(mut kinds) = self.kinds.lock() {
            kinds.insert(gvk.clone(), resolved.clone());
        }
        Ok(resolved)
    }

    async fn api(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<Api<DynamicObject>, BackendError> {
        let (resource, capabilities) = self.resolve(gvk).await?;
        Ok(match (capabilities.scope, namespace) {
            (Scope::Namespaced, Some(ns)) if !ns.is_empty() => {
                Api::namespaced_with(self.client.clone(), ns, &resource)
            }
            _ => Api::all_with(self.client.clone(), &resource),
        })
    }

    async fn api_for(&self, identity: &ResourceIdentity) -> Result<Api<DynamicObject>, BackendError> {
        self.api(&identity.gvk(), Some(identity.namespace.as_str()))
            .await
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

/// Map a write failure, turning 409 into the given typed error
fn classify_write_error(
    error: kube::Error,
    identity: &ResourceIdentity,
    on_conflict: fn(String) -> BackendError,
) -> BackendError {
    match error {
        kube::Error::Api(ref ae) if ae.code == 409 => on_conflict(format!("{identity}: {}", ae.message)),
        kube::Error::Api(ref ae) if ae.code == 404 => BackendError::NotFound(identity.to_string()),
        other => BackendError::Kube(other),
    }
}

#[async_trait]
impl ClusterBackend for KubeBackend {
    async fn get(&self, identity: &ResourceIdentity) -> Result<Option<DynamicObject>, BackendError> {
        let api = self.api_for(identity).await?;
        Ok(api.get_opt(&identity.name).await?)
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        filter: &ListFilter,
    ) -> Result<Vec<DynamicObject>, BackendError> {
        let api = self.api(gvk, filter.namespace.as_deref()).await?;
        let mut params = ListParams::default();
        if let Some(selector) = &filter.label_selector {
            params = params.labels(selector);
        }
        Ok(api.list(&params).await?.items)
    }

    async fn create(&self, object: &DynamicObject) -> Result<DynamicObject, BackendError> {
        let identity = identity_of(object)?;
        let api = self.api_for(&identity).await?;
        api.create(&post_params(), object)
            .await
            .map_err(|e| classify_write_error(e, &identity, BackendError::AlreadyExists))
    }

    async fn update(&self, object: &DynamicObject) -> Result<DynamicObject, BackendError> {
        let identity = identity_of(object)?;
        let api = self.api_for(&identity).await?;
        api.replace(&identity.name, &post_params(), object)
            .await
            .map_err(|e| classify_write_error(e, &identity, BackendError::Conflict))
    }

    async fn update_status(&self, object: &DynamicObject) -> Result<DynamicObject, BackendError> {
        let identity = identity_of(object)?;
        let api = self.api_for(&identity).await?;
        // resourceVersion in a merge patch makes the write conditional
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": object.metadata.resource_version },
            "status": object.data.get("status").cloned().unwrap_or(serde_json::Value::Null),
        });
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        api.patch_status(&identity.name, &params, &Patch::Merge(&patch))
            .await
            .map_err(|e| classify_write_error(e, &identity, BackendError::Conflict))
    }

    async fn watch(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<WatchStream, BackendError> {
        let api = self.api(gvk, namespace).await?;
        // A relist after a desync replays current objects as applied
        let stream = watcher(api, watcher::Config::default())
            .default_backoff()
            .filter_map(|event| async move {
                match event {
                    Ok(watcher::Event::Apply(object) | watcher::Event::InitApply(object)) => {
                        Some(Ok(WatchEvent::Applied(object)))
                    }
                    Ok(watcher::Event::Delete(object)) => Some(Ok(WatchEvent::Deleted(object))),
                    Ok(watcher::Event::Init | watcher::Event::InitDone) => None,
                    Err(e) => Some(Err(BackendError::Watch(e.to_string()))),
                }
            });
        Ok(stream.boxed())
    }
}

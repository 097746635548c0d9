//! # In-Memory Backend
//!
//! A process-local object store with the same conditional-write rules as the
//! API server: every write bumps `resourceVersion`, spec changes bump
//! `generation`, and stale writes fail with `Conflict`. Status is only
//! writable through `update_status`.

use super::{identity_of, BackendError, ClusterBackend, ListFilter, WatchEvent, WatchStream};
use crate::crd::ResourceIdentity;
use async_trait::async_trait;
use futures::StreamExt;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

const WATCH_CHANNEL_CAPACITY: usize = 256;

/// Shared in-process object store; clones share state
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    objects: RwLock<BTreeMap<String, DynamicObject>>,
    resource_version: AtomicU64,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                objects: RwLock::new(BTreeMap::new()),
                resource_version: AtomicU64::new(0),
                events,
            }),
        }
    }

    /// Store an object as-is, status included, replacing any existing copy
    pub async fn insert(&self, object: DynamicObject) -> Result<DynamicObject, BackendError> {
        let identity = identity_of(&object)?;
        let mut object = object;
        let mut objects = self.inner.objects.write().await;
        let previous = objects.get(&store_key(&identity));
        object.metadata.uid = previous
            .and_then(|p| p.metadata.uid.clone())
            .or(object.metadata.uid)
            .or_else(|| Some(uuid::Uuid::new_v4().to_string()));
        object.metadata.generation = object.metadata.generation.or(Some(1));
        object.metadata.resource_version = Some(self.next_resource_version());
        objects.insert(store_key(&identity), object.clone());
        drop(objects);
        self.publish(WatchEvent::Applied(object.clone()));
        Ok(object)
    }

    /// Overwrite the status of a stored object the way a workload controller would
    pub async fn set_observed_status(
        &self,
        identity: &ResourceIdentity,
        status: Value,
    ) -> Result<DynamicObject, BackendError> {
        self.edit(identity, |object| set_status(object, status))
            .await
    }

    /// Bump the resourceVersion without changing content, as a concurrent writer would
    pub async fn bump_resource_version(
        &self,
        identity: &ResourceIdentity,
    ) -> Result<DynamicObject, BackendError> {
        self.edit(identity, |_| {}).await
    }

    /// Delete an object, returning it if it existed
    pub async fn remove(&self, identity: &ResourceIdentity) -> Option<DynamicObject> {
        let removed = self
            .inner
            .objects
            .write()
            .await
            .remove(&store_key(identity));
        if let Some(object) = &removed {
            self.publish(WatchEvent::Deleted(object.clone()));
        }
        removed
    }

    /// Every stored object of a kind, across namespaces
    pub async fn objects_of_kind(&self, kind: &str) -> Vec<DynamicObject> {
        self.inner
            .objects
            .read()
            .await
            .values()
            .filter(|o| o.types.as_ref().is_some_and(|t| t.kind == kind))
            .cloned()
            .collect()
    }

    /// Change a stored object in place, as another writer would
    pub async fn edit(
        &self,
        identity: &ResourceIdentity,
        change: impl FnOnce(&mut DynamicObject),
    ) -> Result<DynamicObject, BackendError> {
        let mut objects = self.inner.objects.write().await;
        let object = objects
            .get_mut(&store_key(identity))
            .ok_or_else(|| BackendError::NotFound(identity.to_string()))?;
        change(object);
        object.metadata.resource_version = Some(self.next_resource_version());
        let updated = object.clone();
        drop(objects);
        self.publish(WatchEvent::Applied(updated.clone()));
        Ok(updated)
    }

    fn next_resource_version(&self) -> String {
        (self.inner.resource_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn publish(&self, event: WatchEvent) {
        // No receivers is the common case outside of watch tests
        let _ = self.inner.events.send(event);
    }
}

#[async_trait]
impl ClusterBackend for InMemoryBackend {
    async fn get(&self, identity: &ResourceIdentity) -> Result<Option<DynamicObject>, BackendError> {
        Ok(self
            .inner
            .objects
            .read()
            .await
            .get(&store_key(identity))
            .cloned())
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        filter: &ListFilter,
    ) -> Result<Vec<DynamicObject>, BackendError> {
        let selector = parse_label_selector(filter.label_selector.as_deref())?;
        Ok(self
            .inner
            .objects
            .read()
            .await
            .values()
            .filter(|o| matches_kind(o, gvk))
            .filter(|o| match &filter.namespace {
                Some(namespace) => o.metadata.namespace.as_deref() == Some(namespace.as_str()),
                None => true,
            })
            .filter(|o| matches_labels(o, &selector))
            .cloned()
            .collect())
    }

    async fn create(&self, object: &DynamicObject) -> Result<DynamicObject, BackendError> {
        let identity = identity_of(object)?;
        let key = store_key(&identity);
        let mut objects = self.inner.objects.write().await;
        if objects.contains_key(&key) {
            return Err(BackendError::AlreadyExists(identity.to_string()));
        }

        let mut created = object.clone();
        strip_status(&mut created);
        created.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        created.metadata.generation = Some(1);
        created.metadata.resource_version = Some(self.next_resource_version());
        objects.insert(key, created.clone());
        drop(objects);

        self.publish(WatchEvent::Applied(created.clone()));
        Ok(created)
    }

    async fn update(&self, object: &DynamicObject) -> Result<DynamicObject, BackendError> {
        let identity = identity_of(object)?;
        let mut objects = self.inner.objects.write().await;
        let stored = objects
            .get_mut(&store_key(&identity))
            .ok_or_else(|| BackendError::NotFound(identity.to_string()))?;
        check_resource_version(object, stored, &identity)?;

        let mut updated = object.clone();
        strip_status(&mut updated);
        if let Some(status) = stored.data.get("status").cloned() {
            set_status(&mut updated, status);
        }
        updated.metadata.uid = stored.metadata.uid.clone();
        let spec_changed = without_status(&updated.data) != without_status(&stored.data);
        let generation = stored.metadata.generation.unwrap_or(1);
        updated.metadata.generation = Some(if spec_changed { generation + 1 } else { generation });
        updated.metadata.resource_version = Some(self.next_resource_version());
        *stored = updated.clone();
        drop(objects);

        self.publish(WatchEvent::Applied(updated.clone()));
        Ok(updated)
    }

    async fn update_status(&self, object: &DynamicObject) -> Result<DynamicObject, BackendError> {
        let identity = identity_of(object)?;
        let mut objects = self.inner.objects.write().await;
        let stored = objects
            .get_mut(&store_key(&identity))
            .ok_or_else(|| BackendError::NotFound(identity.to_string()))?;
        check_resource_version(object, stored, &identity)?;

        match object.data.get("status") {
            Some(status) => set_status(stored, status.clone()),
            None => strip_status(stored),
        }
        stored.metadata.resource_version = Some(self.next_resource_version());
        let updated = stored.clone();
        drop(objects);

        self.publish(WatchEvent::Applied(updated.clone()));
        Ok(updated)
    }

    async fn watch(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<WatchStream, BackendError> {
        let gvk = gvk.clone();
        let namespace = namespace.map(str::to_string);
        let receiver = self.inner.events.subscribe();

        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((Ok(event), receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "in-memory watch lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .filter(move |event: &Result<WatchEvent, BackendError>| {
            let keep = match event {
                Ok(event) => {
                    let object = event.object();
                    matches_kind(object, &gvk)
                        && namespace
                            .as_deref()
                            .is_none_or(|ns| object.metadata.namespace.as_deref() == Some(ns))
                }
                Err(_) => true,
            };
            futures::future::ready(keep)
        });

        Ok(stream.boxed())
    }
}

fn store_key(identity: &ResourceIdentity) -> String {
    format!(
        "{}/{}/{}/{}",
        identity.group, identity.kind, identity.namespace, identity.name
    )
}

fn matches_kind(object: &DynamicObject, gvk: &GroupVersionKind) -> bool {
    object.types.as_ref().is_some_and(|types| {
        let (group, _) = crate::crd::split_api_version(&types.api_version);
        group == gvk.group && types.kind == gvk.kind
    })
}

fn check_resource_version(
    incoming: &DynamicObject,
    stored: &DynamicObject,
    identity: &ResourceIdentity,
) -> Result<(), BackendError> {
    match &incoming.metadata.resource_version {
        Some(expected) if Some(expected) != stored.metadata.resource_version.as_ref() => {
            Err(BackendError::Conflict(format!(
                "{} expected resourceVersion {} but found {}",
                identity,
                expected,
                stored.metadata.resource_version.as_deref().unwrap_or("<none>")
            )))
        }
        _ => Ok(()),
    }
}

fn set_status(object: &mut DynamicObject, status: Value) {
    match object.data.as_object_mut() {
        Some(map) => {
            map.insert("status".to_string(), status);
        }
        None => object.data = serde_json::json!({ "status": status }),
    }
}

fn strip_status(object: &mut DynamicObject) {
    if let Some(map) = object.data.as_object_mut() {
        map.remove("status");
    }
}

fn without_status(data: &Value) -> Value {
    let mut data = data.clone();
    if let Some(map) = data.as_object_mut() {
        map.remove("status");
    }
    data
}

fn parse_label_selector(selector: Option<&str>) -> Result<Vec<(String, String)>, BackendError> {
    let Some(selector) = selector.filter(|s| !s.trim().is_empty()) else {
        return Ok(Vec::new());
    };
    selector
        .split(',')
        .map(|term| {
            term.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim_start_matches('=').trim().to_string()))
                .ok_or_else(|| {
                    BackendError::InvalidObject(format!(
                        "unsupported label selector term '{term}'"
                    ))
                })
        })
        .collect()
}

fn matches_labels(object: &DynamicObject, selector: &[(String, String)]) -> bool {
    selector.iter().all(|(key, value)| {
        object
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .is_some_and(|v| v == value)
    })
}

//! # Persist
//!
//! Create-or-update of child objects and conditional status writes.
//!
//! A child is created when absent. When present it is updated from the live
//! copy: the live resourceVersion makes the write conditional, labels and
//! annotations are merged with desired values winning, and fields the API
//! server allocates (a Service's cluster IPs) are carried over. If the live
//! object already contains every desired field the write is skipped.

use crate::backend::{from_dynamic, identity_of, to_dynamic, BackendError, ClusterBackend};
use crate::crd::{Component, ResourceIdentity};
use kube::api::DynamicObject;
use kube::core::Resource as KubeResource;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde_json::Value;
use tracing::{debug, trace};

/// Create `desired` or bring the live copy in line with it
pub async fn create_or_update<C: Component>(
    backend: &dyn ClusterBackend,
    owner: &C,
    desired: &DynamicObject,
) -> Result<DynamicObject, BackendError> {
    let identity = identity_of(desired)?;
    let mut desired = desired.clone();
    if let Some(owner_ref) = owner_reference_for(owner, &identity) {
        set_owner_reference(&mut desired, owner_ref);
    }

    match backend.get(&identity).await? {
        None => {
            debug!(resource = %identity, "creating child resource");
            backend.create(&desired).await.map_err(|e| match e {
                // Lost a race with another writer; retried on the next pass
                BackendError::AlreadyExists(what) => BackendError::Conflict(what),
                other => other,
            })
        }
        Some(live) => {
            merge_from_live(&mut desired, &live, &identity);
            if is_subset(&serde_json::to_value(&desired)?, &serde_json::to_value(&live)?) {
                trace!(resource = %identity, "child resource unchanged");
                return Ok(live);
            }
            debug!(resource = %identity, "updating child resource");
            backend.update(&desired).await
        }
    }
}

/// Write the component's status sub-document, conditional on its resourceVersion
pub async fn write_status<C: Component>(
    backend: &dyn ClusterBackend,
    component: &C,
) -> Result<C, BackendError> {
    let object = to_dynamic(component)?;
    let updated = backend.update_status(&object).await?;
    from_dynamic(&updated)
}

/// Controller reference for a child, when ownership can be expressed.
///
/// Namespaced owners can only own children in their own namespace.
pub fn owner_reference_for<C: Component>(
    owner: &C,
    child: &ResourceIdentity,
) -> Option<OwnerReference> {
    let same_scope = match owner.meta().namespace.as_deref() {
        Some(namespace) => child.namespace == namespace,
        None => true,
    };
    if !same_scope {
        return None;
    }
    owner.controller_owner_ref(&())
}

fn set_owner_reference(object: &mut DynamicObject, owner_ref: OwnerReference) {
    let refs = object.metadata.owner_references.get_or_insert_with(Vec::new);
    match refs.iter_mut().find(|r| r.uid == owner_ref.uid) {
        Some(existing) => *existing = owner_ref,
        None => refs.push(owner_ref),
    }
}

/// Carry live-only state onto the desired object before an update
pub fn merge_from_live(desired: &mut DynamicObject, live: &DynamicObject, identity: &ResourceIdentity) {
    desired.metadata.resource_version = live.metadata.resource_version.clone();

    if let Some(live_labels) = &live.metadata.labels {
        let mut labels = live_labels.clone();
        labels.extend(desired.metadata.labels.take().unwrap_or_default());
        desired.metadata.labels = Some(labels);
    }
    if let Some(live_annotations) = &live.metadata.annotations {
        let mut annotations = live_annotations.clone();
        annotations.extend(desired.metadata.annotations.take().unwrap_or_default());
        desired.metadata.annotations = Some(annotations);
    }
    if let Some(live_refs) = &live.metadata.owner_references {
        let refs = desired.metadata.owner_references.get_or_insert_with(Vec::new);
        for live_ref in live_refs {
            if !refs.iter().any(|r| r.uid == live_ref.uid) {
                refs.push(live_ref.clone());
            }
        }
    }

    if identity.group.is_empty() && identity.kind == "Service" {
        preserve_service_cluster_ips(desired, live);
    }
}

fn preserve_service_cluster_ips(desired: &mut DynamicObject, live: &DynamicObject) {
    let Some(live_spec) = live.data.get("spec") else {
        return;
    };
    let Some(desired_spec) = desired.data.get_mut("spec").and_then(Value::as_object_mut) else {
        return;
    };
    for field in ["clusterIP", "clusterIPs"] {
        if !desired_spec.contains_key(field) {
            if let Some(value) = live_spec.get(field) {
                desired_spec.insert(field.to_string(), value.clone());
            }
        }
    }
}

/// True when every field of `desired` is present with an equal value in `live`.
///
/// Arrays must match in length; their elements are compared the same way, so
/// fields defaulted by the server inside list items do not count as drift.
#[must_use]
pub fn is_subset(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Object(d), Value::Object(l)) => d
            .iter()
            .all(|(key, value)| value.is_null() || l.get(key).is_some_and(|lv| is_subset(value, lv))),
        (Value::Array(d), Value::Array(l)) => {
            d.len() == l.len() && d.iter().zip(l).all(|(dv, lv)| is_subset(dv, lv))
        }
        _ => desired == live,
    }
}

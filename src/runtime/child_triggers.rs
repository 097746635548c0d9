//! # Child Triggers
//!
//! Maps changes to owned children back to the component that controls them.
//!
//! Each child kind is listed once for its current objects and then watched
//! for further changes, both through the [`ClusterBackend`]. Every object
//! whose controlling ownerReference points at a component of kind `K` yields
//! an [`ObjectRef`] that re-delivers that component.

use crate::backend::{BackendError, ClusterBackend, ListFilter, WatchEvent};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::Resource;
use kube_runtime::reflector::ObjectRef;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reference to the component of kind `K` controlling `object`, if any
pub fn controlling_owner<K>(object: &DynamicObject) -> Option<ObjectRef<K>>
where
    K: Resource<DynamicType = ()>,
{
    let owner = object
        .metadata
        .owner_references
        .as_ref()?
        .iter()
        .find(|owner| owner.controller == Some(true))?;
    if owner.kind != K::kind(&()) || owner.api_version != K::api_version(&()) {
        return None;
    }

    let reference = ObjectRef::new(&owner.name);
    Some(match object.metadata.namespace.as_deref() {
        Some(namespace) => reference.within(namespace),
        None => reference,
    })
}

/// Stream of component references for every existing and future change to a
/// child of one of `kinds`.
///
/// The watch is opened before the list so no change between the two is lost;
/// a change seen by both only re-delivers the component twice. Watch errors
/// are logged and skipped.
pub async fn child_triggers<K>(
    backend: Arc<dyn ClusterBackend>,
    kinds: &[GroupVersionKind],
    namespace: Option<&str>,
) -> Result<BoxStream<'static, ObjectRef<K>>, BackendError>
where
    K: Resource<DynamicType = ()> + 'static,
{
    let filter = ListFilter {
        namespace: namespace.map(str::to_string),
        label_selector: None,
    };

    let mut triggers = Vec::with_capacity(kinds.len());
    for gvk in kinds {
        let changes = backend.watch(gvk, namespace).await?;
        let existing = backend.list(gvk, &filter).await?;
        debug!(kind = %gvk.kind, existing = existing.len(), "watching child kind");

        let kind = gvk.kind.clone();
        let changes = changes.filter_map(move |event| {
            let object = match event {
                Ok(WatchEvent::Applied(object) | WatchEvent::Deleted(object)) => Some(object),
                Err(e) => {
                    warn!(kind = %kind, error = %e, "child watch error");
                    None
                }
            };
            futures::future::ready(object)
        });

        triggers.push(
            stream::iter(existing)
                .chain(changes)
                .filter_map(|object| futures::future::ready(controlling_owner::<K>(&object)))
                .boxed(),
        );
    }

    Ok(stream::select_all(triggers).boxed())
}

//! # Component Phases
//!
//! Bodies of the component-level phases. Each returns whether the pass may
//! proceed; condition bookkeeping happens in `exit.rs`.

use super::resource::run_resource_phases;
use super::PhaseKind;
use crate::backend::identity_of;
use crate::controller::reconciler::{ComponentReconciler, Mutation};
use crate::crd::{Component, ResourceIdentity};
use kube::Resource as KubeResource;
use anyhow::Context;
use kube::api::DynamicObject;
use tracing::{debug, info, trace};

pub(super) async fn run_phase<R: ComponentReconciler>(
    phase: PhaseKind,
    reconciler: &mut R,
) -> anyhow::Result<bool> {
    match phase {
        PhaseKind::Dependency => dependency(reconciler).await,
        PhaseKind::PreFlight => reconciler.pre_flight().await,
        PhaseKind::CreateResources => create_resources(reconciler).await,
        PhaseKind::CheckReady => check_ready(reconciler).await,
        PhaseKind::Complete => complete(reconciler),
    }
}

async fn dependency<R: ComponentReconciler>(reconciler: &mut R) -> anyhow::Result<bool> {
    let satisfied = reconciler.check_dependencies().await?;
    reconciler.set_dependency_status(satisfied);
    if !satisfied {
        debug!(parent: reconciler.logger(), "dependencies not yet satisfied");
    }
    Ok(satisfied)
}

async fn create_resources<R: ComponentReconciler>(reconciler: &mut R) -> anyhow::Result<bool> {
    let children = build_children(reconciler)?;
    reconciler.set_child_resources(children.clone());

    for child in &children {
        if !run_resource_phases(reconciler, child).await? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Construct, mutate and de-duplicate the children for this pass.
///
/// A later object with the same identity replaces an earlier one in place.
fn build_children<R: ComponentReconciler>(reconciler: &R) -> anyhow::Result<Vec<DynamicObject>> {
    let constructed = reconciler
        .construct_resources()
        .context("unable to construct child resources")?;

    let mut identities: Vec<ResourceIdentity> = Vec::new();
    let mut children: Vec<DynamicObject> = Vec::new();
    for object in constructed {
        let mutated = match reconciler.mutate(object)? {
            Mutation::Skip => {
                trace!(parent: reconciler.logger(), "child skipped by mutation");
                continue;
            }
            Mutation::Replace(objects) => objects,
        };
        for child in mutated {
            let identity = identity_of(&child)?;
            match identities.iter().position(|existing| *existing == identity) {
                Some(index) => children[index] = child,
                None => {
                    identities.push(identity);
                    children.push(child);
                }
            }
        }
    }
    Ok(children)
}

/// Every child passes its kind's readiness rule, then the reconciler's own
/// predicate. ConfigMaps and Secrets are held to the keys the reconciler
/// expects of them.
async fn check_ready<R: ComponentReconciler>(reconciler: &mut R) -> anyhow::Result<bool> {
    for child in reconciler.child_resources() {
        let identity = identity_of(child)?;
        let expected_keys = reconciler.expected_keys(&identity);
        if !reconciler
            .readiness()
            .is_ready_with_keys(reconciler.client(), &identity, &expected_keys)
            .await?
        {
            debug!(parent: reconciler.logger(), resource = %identity, "child resource not ready");
            return Ok(false);
        }
    }

    reconciler.check_ready().await
}

fn complete<R: ComponentReconciler>(reconciler: &mut R) -> anyhow::Result<bool> {
    reconciler.set_ready_status(true);
    let generation = reconciler.component().meta().generation;
    reconciler.component_mut().status_mut().observed_generation = generation;
    info!(parent: reconciler.logger(), "successfully reconciled");
    Ok(true)
}

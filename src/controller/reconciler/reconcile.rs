//! # Reconciliation Logic
//!
//! Entry point handed to the kube-runtime controller. Each call builds a
//! request-scoped reconciler, runs the phase machine and maps the outcome to
//! an [`Action`] using the controller's rate limiter.

use crate::controller::phases::execute_phases;
use crate::controller::reconciler::traits::ComponentReconciler;
use crate::controller::reconciler::types::{
    ControllerContext, ReconcileContext, ReconcileOutcome, ReconcilerError,
};
use crate::crd::Component;
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, Instrument};
use uuid::Uuid;

/// Main reconciliation function
pub async fn reconcile<R: ComponentReconciler>(
    component: Arc<R::Component>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcilerError> {
    let key = component.reconcile_key();
    match reconcile_component::<R>(component.as_ref().clone(), &ctx).await {
        Ok(outcome) => Ok(action_for(&ctx, &key, outcome)),
        Err(e) => {
            if !matches!(e, ReconcilerError::Cancelled) {
                observability::increment_reconciliation_errors();
            }
            Err(e)
        }
    }
}

/// Run one reconcile pass and return the outcome without scheduling anything
pub async fn reconcile_component<R: ComponentReconciler>(
    component: R::Component,
    ctx: &ControllerContext,
) -> Result<ReconcileOutcome, ReconcilerError> {
    let start = Instant::now();
    observability::increment_reconciliations();

    let reconcile_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "controller.reconcile",
        resource.name = %component.name_any(),
        resource.namespace = component.namespace().as_deref().unwrap_or(""),
        reconcile.id = %reconcile_id,
    );

    let context = ReconcileContext::new(&component, ctx, reconcile_id, span.clone());
    let mut reconciler = R::build(component, context);

    let result = execute_phases(&mut reconciler).instrument(span.clone()).await;
    observability::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    match &result {
        Ok(outcome) => {
            debug!(parent: &span, outcome = outcome.as_str(), "reconcile pass finished");
        }
        Err(ReconcilerError::Cancelled) => {
            debug!(parent: &span, "reconcile pass cancelled");
        }
        Err(e) => {
            error!(parent: &span, error = %e, "reconcile pass failed");
        }
    }
    result
}

/// Translate an outcome into a controller action, updating the limiter
pub fn action_for(ctx: &ControllerContext, key: &str, outcome: ReconcileOutcome) -> Action {
    let key = key.to_string();
    match outcome {
        ReconcileOutcome::Done => {
            ctx.rate_limiter.forget(&key);
            Action::await_change()
        }
        ReconcileOutcome::Requeue => {
            let delay = ctx.rate_limiter.when(&key);
            observability::increment_requeues("pending");
            Action::requeue(delay)
        }
        ReconcileOutcome::RequeueAfter(delay) => {
            ctx.rate_limiter.forget(&key);
            observability::increment_requeues("scheduled");
            Action::requeue(delay)
        }
    }
}

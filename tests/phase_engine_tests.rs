//! # Phase Engine Tests
//!
//! Exercises the phase machine through a batch component whose children are
//! settings ConfigMaps and a migration Job.
//!
//! These tests verify:
//! - Mutation can skip a child or fan it out into several
//! - The dependency phase gates everything after it
//! - A failed Job surfaces as a Failed CheckReady condition
//! - Settings missing an expected key hold CheckReady
//! - Optimistic-lock conflicts are absorbed at phase boundaries
//! - Cancellation stops a pass before its next phase

mod common;

use common::*;
use component_controller::backend::BackendError;
use component_controller::controller::phases::{execute_phases, handle_phase_exit, PhaseKind};
use component_controller::controller::reconciler::{
    ComponentReconciler, ReconcileOutcome, ReconcilerError, WebStoreReconciler,
};
use component_controller::crd::{Component, PhaseState};
use serde_json::json;

/// Report the migration Job as finished with the given success count
async fn finish_job(cluster: &TestCluster, succeeded: i32, failed: i32) {
    cluster
        .backend
        .set_observed_status(
            &job("migrate"),
            json!({
                "active": 0,
                "succeeded": succeeded,
                "failed": failed,
                "completionTime": "2026-01-01T00:00:00Z"
            }),
        )
        .await
        .unwrap();
}

// ============================================================================
// Mutation
// ============================================================================

#[tokio::test]
async fn test_mutation_fans_out_settings_per_environment() {
    let cluster = TestCluster::with_namespace().await;
    let run = cluster.seed(&batch_run(&["staging", "prod"])).await;

    let outcome = cluster.pass::<BatchRunReconciler>(&run).await.unwrap();

    // The Job has not finished yet
    assert_eq!(outcome, ReconcileOutcome::Requeue);
    assert!(cluster.get(&config_map("settings-staging")).await.is_some());
    assert!(cluster.get(&config_map("settings-prod")).await.is_some());
    assert!(
        cluster.get(&config_map("settings")).await.is_none(),
        "the constructed ConfigMap is replaced by its fan-out"
    );
    assert!(cluster.get(&job("migrate")).await.is_some());

    let status = cluster.fetch(&run).await.status.unwrap();
    assert_eq!(status.resources.len(), 3);
    assert_state(&status, PhaseKind::CreateResources, PhaseState::Complete);
    assert_state(&status, PhaseKind::CheckReady, PhaseState::Pending);
}

#[tokio::test]
async fn test_mutation_can_skip_a_child() {
    let cluster = TestCluster::with_namespace().await;
    let run = cluster.seed(&batch_run(&[])).await;

    cluster.pass::<BatchRunReconciler>(&run).await.unwrap();

    assert_eq!(cluster.count("ConfigMap").await, 0);
    assert_eq!(cluster.count("Job").await, 1);
    let status = cluster.fetch(&run).await.status.unwrap();
    assert_eq!(status.resources.len(), 1);
    assert_eq!(status.resources[0].identity, job("migrate"));
}

// ============================================================================
// Dependencies
// ============================================================================

#[tokio::test]
async fn test_unmet_dependency_blocks_every_later_phase() {
    let cluster = TestCluster::with_namespace().await;
    let mut pending = batch_run(&["prod"]);
    pending.spec.requires = Some("shared-credentials".to_string());
    let run = cluster.seed(&pending).await;

    let outcome = cluster.pass::<BatchRunReconciler>(&run).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Requeue);
    assert_eq!(cluster.count("Job").await, 0);
    let status = cluster.fetch(&run).await.status.unwrap();
    assert!(!status.dependencies_satisfied);
    assert_state(&status, PhaseKind::Dependency, PhaseState::Pending);
    assert_eq!(status.conditions.len(), 1, "no phase after Dependency should run");
}

#[tokio::test]
async fn test_dependency_satisfied_once_config_map_exists() {
    let cluster = TestCluster::with_namespace().await;
    let mut pending = batch_run(&["prod"]);
    pending.spec.requires = Some("shared-credentials".to_string());
    let run = cluster.seed(&pending).await;
    cluster.pass::<BatchRunReconciler>(&run).await.unwrap();

    let credentials = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": "shared-credentials", "namespace": NAMESPACE },
        "data": { "token": "abc" }
    }))
    .unwrap();
    cluster.backend.insert(credentials).await.unwrap();
    cluster.pass::<BatchRunReconciler>(&run).await.unwrap();

    let status = cluster.fetch(&run).await.status.unwrap();
    assert!(status.dependencies_satisfied);
    assert_state(&status, PhaseKind::Dependency, PhaseState::Complete);
    assert_state(&status, PhaseKind::CreateResources, PhaseState::Complete);
    assert_eq!(cluster.count("Job").await, 1);
}

// ============================================================================
// Job outcomes
// ============================================================================

#[tokio::test]
async fn test_successful_job_completes_the_run() {
    let cluster = TestCluster::with_namespace().await;
    let run = cluster.seed(&batch_run(&["prod"])).await;
    cluster.pass::<BatchRunReconciler>(&run).await.unwrap();

    finish_job(&cluster, 1, 0).await;
    let outcome = cluster.pass::<BatchRunReconciler>(&run).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Done);
    let status = cluster.fetch(&run).await.status.unwrap();
    assert!(status.ready);
    assert_state(&status, PhaseKind::Complete, PhaseState::Complete);
}

#[tokio::test]
async fn test_failed_job_is_reported_as_failed_check_ready() {
    let cluster = TestCluster::with_namespace().await;
    let run = cluster.seed(&batch_run(&["prod"])).await;
    cluster.pass::<BatchRunReconciler>(&run).await.unwrap();

    finish_job(&cluster, 0, 1).await;
    let result = cluster.pass::<BatchRunReconciler>(&run).await;

    let err = result.expect_err("a failed Job should fail the pass");
    assert!(matches!(err, ReconcilerError::ReconciliationFailed(_)));
    assert!(
        err.to_string().contains("job migrate was not successful"),
        "unexpected error: {err}"
    );

    let status = cluster.fetch(&run).await.status.unwrap();
    assert!(!status.ready);
    let check_ready = condition(&status, PhaseKind::CheckReady);
    assert_eq!(check_ready.state, PhaseState::Failed);
    assert_eq!(
        check_ready.message,
        "Failed Phase with Error; job migrate was not successful"
    );
    assert!(status.phase_condition(PhaseKind::Complete.name()).is_none());
}

// ============================================================================
// Expected keys
// ============================================================================

#[tokio::test]
async fn test_settings_missing_a_required_key_hold_check_ready() {
    let cluster = TestCluster::with_namespace().await;
    let mut keyed = batch_run(&["prod"]);
    keyed.spec.required_settings = vec!["image".to_string(), "region".to_string()];
    let run = cluster.seed(&keyed).await;
    cluster.pass::<BatchRunReconciler>(&run).await.unwrap();
    finish_job(&cluster, 1, 0).await;

    // The constructed settings only carry `image`
    let outcome = cluster.pass::<BatchRunReconciler>(&run).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Requeue);
    let status = cluster.fetch(&run).await.status.unwrap();
    assert!(!status.ready);
    assert_state(&status, PhaseKind::CreateResources, PhaseState::Complete);
    assert_state(&status, PhaseKind::CheckReady, PhaseState::Pending);
    assert!(status.phase_condition(PhaseKind::Complete.name()).is_none());
}

#[tokio::test]
async fn test_settings_with_every_required_key_complete_the_run() {
    let cluster = TestCluster::with_namespace().await;
    let mut keyed = batch_run(&["prod"]);
    keyed.spec.required_settings = vec!["image".to_string()];
    let run = cluster.seed(&keyed).await;
    cluster.pass::<BatchRunReconciler>(&run).await.unwrap();
    finish_job(&cluster, 1, 0).await;

    let outcome = cluster.pass::<BatchRunReconciler>(&run).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Done);
    assert!(cluster.fetch(&run).await.status.unwrap().ready);
}

// ============================================================================
// Conflicts
// ============================================================================

#[tokio::test]
async fn test_conflicting_status_write_is_absorbed() {
    let cluster = TestCluster::with_namespace().await;
    let store = cluster.seed(&webstore()).await;
    cluster.pass::<WebStoreReconciler>(&store).await.unwrap();
    cluster.allocate_cluster_ip("webstore-svc").await;

    // Reconcile a copy made stale by another writer
    let stale = cluster.fetch(&store).await;
    cluster.backend.bump_resource_version(&store.identity()).await.unwrap();
    let outcome = component_controller::reconcile_component::<WebStoreReconciler>(stale, &cluster.ctx)
        .await
        .expect("conflicts must not surface as errors");

    assert_eq!(outcome, ReconcileOutcome::Requeue);
    // The child write itself went through before the status write conflicted
    assert!(cluster.get(&ingress("webstore-ing")).await.is_some());

    // A fresh copy picks up where the conflicting pass left off
    cluster.roll_out_deployment("webstore-deploy", 2).await;
    let outcome = cluster.pass::<WebStoreReconciler>(&store).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Done);
    assert_eq!(cluster.count("Ingress").await, 1);
}

#[tokio::test]
async fn test_conflict_exit_requeues_instead_of_finishing() {
    let cluster = TestCluster::with_namespace().await;
    let store = cluster.seed(&webstore()).await;
    let mut reconciler = cluster.reconciler::<WebStoreReconciler>(store);

    let conflict = anyhow::Error::new(BackendError::Conflict("webstores/storefront".to_string()));
    let exit = handle_phase_exit(&mut reconciler, PhaseKind::CreateResources, Err(conflict))
        .await
        .expect("conflict should not be returned");

    assert!(!exit.proceed);
    assert_eq!(exit.outcome, ReconcileOutcome::Requeue);
    let status = reconciler.component().status().unwrap();
    assert_state(status, PhaseKind::CreateResources, PhaseState::Complete);
    assert!(!status.ready);
}

#[tokio::test]
async fn test_pending_exit_clears_ready() {
    let cluster = TestCluster::with_namespace().await;
    let store = cluster.seed(&webstore()).await;
    let mut reconciler = cluster.reconciler::<WebStoreReconciler>(store);
    reconciler.set_ready_status(true);

    let exit = handle_phase_exit(&mut reconciler, PhaseKind::CheckReady, Ok(false))
        .await
        .unwrap();

    assert!(!exit.proceed);
    let status = reconciler.component().status().unwrap();
    assert_state(status, PhaseKind::CheckReady, PhaseState::Pending);
    assert!(!status.ready);
}

#[tokio::test]
async fn test_other_errors_are_returned_from_phase_exit() {
    let cluster = TestCluster::with_namespace().await;
    let store = cluster.seed(&webstore()).await;
    let mut reconciler = cluster.reconciler::<WebStoreReconciler>(store);

    let result = handle_phase_exit(
        &mut reconciler,
        PhaseKind::PreFlight,
        Err(anyhow::anyhow!("image pull secret missing")),
    )
    .await;

    let err = result.expect_err("non-conflict errors propagate");
    assert_eq!(err.to_string(), "image pull secret missing");
    let persisted = cluster.fetch(reconciler.component()).await.status.unwrap();
    assert_eq!(
        condition(&persisted, PhaseKind::PreFlight).message,
        "Failed Phase with Error; image pull secret missing"
    );
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancelled_pass_runs_no_phase() {
    let cluster = TestCluster::with_namespace().await;
    let store = cluster.seed(&webstore()).await;
    let mut reconciler = cluster.reconciler::<WebStoreReconciler>(store.clone());

    cluster.ctx.shutdown.cancel();
    let result = execute_phases(&mut reconciler).await;

    assert!(matches!(result, Err(ReconcilerError::Cancelled)));
    assert_eq!(cluster.count("Deployment").await, 0);
    assert!(cluster.fetch(&store).await.status.is_none());
}

//! # WebStore Reconciliation Tests
//!
//! Drives the WebStore reconciler against an in-memory cluster, one pass at a
//! time, the way the controller would on successive deliveries.
//!
//! These tests verify:
//! - A component becomes ready once every child is persisted and ready
//! - Steady-state passes neither duplicate children nor rewrite status
//! - Namespace readiness gates child creation
//! - Child readiness gates the CheckReady phase
//! - Validation failures are recorded as Failed conditions

mod common;

use common::*;
use component_controller::controller::phases::{PhaseKind, DEFAULT_PHASES};
use component_controller::controller::reconciler::{
    ReconcileOutcome, ReconcilerError, WebStoreReconciler,
};
use component_controller::crd::{Component, PhaseState, WebStore, WebStoreSpec};

const DEPLOYMENT: &str = "webstore-deploy";
const SERVICE: &str = "webstore-svc";
const INGRESS: &str = "webstore-ing";

/// First pass creates the Deployment and Service but holds the Ingress
async fn first_pass(cluster: &TestCluster, store: &WebStore) {
    let outcome = cluster.pass::<WebStoreReconciler>(store).await;
    assert_eq!(
        outcome.unwrap(),
        ReconcileOutcome::Requeue,
        "Ingress should wait for the Service on the first pass"
    );
}

/// Bring every child to a ready state and run a pass that completes
async fn converge(cluster: &TestCluster, store: &WebStore) {
    first_pass(cluster, store).await;
    cluster.allocate_cluster_ip(SERVICE).await;
    cluster.roll_out_deployment(DEPLOYMENT, 2).await;

    let outcome = cluster.pass::<WebStoreReconciler>(store).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Done);
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_first_pass_holds_ingress_until_service_is_ready() {
    let cluster = TestCluster::with_namespace().await;
    let store = cluster.seed(&webstore()).await;

    first_pass(&cluster, &store).await;

    assert!(cluster.get(&deployment(DEPLOYMENT)).await.is_some());
    assert!(cluster.get(&service(SERVICE)).await.is_some());
    assert!(
        cluster.get(&ingress(INGRESS)).await.is_none(),
        "Ingress must not be created before its Service has a cluster IP"
    );

    let stored = cluster.fetch(&store).await;
    let status = stored.status.expect("status should be written");
    assert!(!status.ready);
    assert_state(&status, PhaseKind::PreFlight, PhaseState::Complete);
    assert_state(&status, PhaseKind::CreateResources, PhaseState::Pending);
    assert!(status.phase_condition(PhaseKind::CheckReady.name()).is_none());

    let held = status
        .resource(&ingress(INGRESS))
        .expect("held Ingress should have a status entry");
    assert!(!held.condition.created);
    assert_eq!(
        held.condition.message,
        "unable to proceed with resource creation; phase WaitForResourcePhase is not ready"
    );

    let created = status.resource(&deployment(DEPLOYMENT)).unwrap();
    assert!(created.condition.created);
    assert_eq!(created.condition.last_resource_phase, "PersistResourcePhase");
}

#[tokio::test]
async fn test_full_pass_marks_webstore_ready() {
    let cluster = TestCluster::with_namespace().await;
    let store = cluster.seed(&webstore()).await;

    converge(&cluster, &store).await;

    let stored = cluster.fetch(&store).await;
    let status = stored.status.expect("status should be written");
    assert!(status.ready, "component should be ready after a full pass");
    assert_eq!(status.observed_generation, Some(1));

    assert_eq!(
        status.conditions.len(),
        DEFAULT_PHASES.len(),
        "exactly one condition per phase: {:?}",
        status.conditions
    );
    for phase in DEFAULT_PHASES {
        assert_state(&status, *phase, PhaseState::Complete);
        assert_eq!(condition(&status, *phase).message, "Successfully Completed Phase");
    }

    assert_eq!(status.resources.len(), 3);
    assert!(status.resources.iter().all(|r| r.condition.created));
}

#[tokio::test]
async fn test_children_are_owned_by_the_webstore() {
    let cluster = TestCluster::with_namespace().await;
    let store = cluster.seed(&webstore()).await;

    converge(&cluster, &store).await;

    let uid = store.metadata.uid.clone().unwrap();
    for identity in [deployment(DEPLOYMENT), service(SERVICE), ingress(INGRESS)] {
        let child = cluster.get(&identity).await.unwrap();
        let owners = child.metadata.owner_references.unwrap_or_default();
        assert_eq!(owners.len(), 1, "{identity} should have one owner");
        assert_eq!(owners[0].uid, uid);
        assert_eq!(owners[0].kind, "WebStore");
        assert_eq!(owners[0].controller, Some(true));
    }
}

#[tokio::test]
async fn test_steady_state_pass_is_idempotent() {
    let cluster = TestCluster::with_namespace().await;
    let store = cluster.seed(&webstore()).await;
    converge(&cluster, &store).await;

    let before = cluster.fetch(&store).await;
    let outcome = cluster.pass::<WebStoreReconciler>(&store).await.unwrap();
    let after = cluster.fetch(&store).await;

    assert_eq!(outcome, ReconcileOutcome::Done);
    assert_eq!(cluster.count("Deployment").await, 1);
    assert_eq!(cluster.count("Service").await, 1);
    assert_eq!(cluster.count("Ingress").await, 1);
    assert_eq!(
        before.status, after.status,
        "unchanged conditions must keep their timestamps"
    );
    assert_eq!(
        before.metadata.resource_version, after.metadata.resource_version,
        "no status write expected when nothing changed"
    );
}

#[tokio::test]
async fn test_spec_change_updates_children_and_keeps_cluster_ip() {
    let cluster = TestCluster::with_namespace().await;
    let store = cluster.seed(&webstore()).await;
    converge(&cluster, &store).await;

    // A spec change forces an update of every child
    cluster
        .backend
        .edit(&store.identity(), |object| {
            object.data["spec"]["webstoreImage"] = serde_json::json!("nginx:1.27");
        })
        .await
        .unwrap();
    let outcome = cluster.pass::<WebStoreReconciler>(&store).await.unwrap();

    let service = cluster.get(&service(SERVICE)).await.unwrap();
    assert_eq!(service.data["spec"]["clusterIP"], "10.96.0.10");
    let deployment = cluster.get(&deployment(DEPLOYMENT)).await.unwrap();
    assert_eq!(
        deployment.data["spec"]["template"]["spec"]["containers"][0]["image"],
        "nginx:1.27"
    );
    // The updated Deployment has not been observed by its controller yet
    assert_eq!(outcome, ReconcileOutcome::Requeue);
}

// ============================================================================
// Gating
// ============================================================================

#[tokio::test]
async fn test_missing_namespace_blocks_child_creation() {
    let cluster = TestCluster::new();
    let store = cluster.seed(&webstore()).await;

    let outcome = cluster.pass::<WebStoreReconciler>(&store).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Requeue);
    assert_eq!(cluster.count("Deployment").await, 0);
    let status = cluster.fetch(&store).await.status.unwrap();
    assert_state(&status, PhaseKind::CreateResources, PhaseState::Pending);
    assert!(!status.ready);
}

#[tokio::test]
async fn test_terminating_namespace_blocks_child_creation() {
    let cluster = TestCluster::new();
    cluster.seed_namespace(NAMESPACE, "Terminating").await;
    let store = cluster.seed(&webstore()).await;

    let outcome = cluster.pass::<WebStoreReconciler>(&store).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Requeue);
    assert_eq!(cluster.count("Deployment").await, 0);
    let status = cluster.fetch(&store).await.status.unwrap();
    let entry = status.resource(&deployment(DEPLOYMENT)).unwrap();
    assert!(!entry.condition.created);
    assert!(entry.condition.message.contains("WaitForResourcePhase is not ready"));
}

#[tokio::test]
async fn test_unready_deployment_holds_check_ready() {
    let cluster = TestCluster::with_namespace().await;
    let store = cluster.seed(&webstore()).await;
    first_pass(&cluster, &store).await;
    cluster.allocate_cluster_ip(SERVICE).await;

    let outcome = cluster.pass::<WebStoreReconciler>(&store).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Requeue);
    let status = cluster.fetch(&store).await.status.unwrap();
    assert_state(&status, PhaseKind::CreateResources, PhaseState::Complete);
    assert_state(&status, PhaseKind::CheckReady, PhaseState::Pending);
    assert!(status.phase_condition(PhaseKind::Complete.name()).is_none());
    assert!(!status.ready);

    cluster.roll_out_deployment(DEPLOYMENT, 2).await;
    let outcome = cluster.pass::<WebStoreReconciler>(&store).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Done);
    assert!(cluster.fetch(&store).await.status.unwrap().ready);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_invalid_spec_fails_pre_flight() {
    let cluster = TestCluster::with_namespace().await;
    let mut invalid = webstore();
    invalid.spec = WebStoreSpec {
        web_store_replicas: -1,
        ..WebStoreSpec::default()
    };
    let store = cluster.seed(&invalid).await;

    let result = cluster.pass::<WebStoreReconciler>(&store).await;

    let err = result.expect_err("negative replicas should fail the pass");
    assert!(matches!(err, ReconcilerError::ReconciliationFailed(_)));
    assert!(err.to_string().contains("webStoreReplicas must not be negative"));

    let status = cluster.fetch(&store).await.status.unwrap();
    let pre_flight = condition(&status, PhaseKind::PreFlight);
    assert_eq!(pre_flight.state, PhaseState::Failed);
    assert_eq!(
        pre_flight.message,
        "Failed Phase with Error; webStoreReplicas must not be negative, got -1"
    );
    assert!(status.phase_condition(PhaseKind::CreateResources.name()).is_none());
    assert_eq!(cluster.count("Deployment").await, 0);
}

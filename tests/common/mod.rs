//! Common test utilities for phase engine integration tests
//!
//! Provides an in-memory cluster seeded with namespaces, a second component
//! kind (`BatchRun`) whose children include a Job and keyed settings, and helpers to run single
//! reconcile passes against stored copies of a component.

#![allow(dead_code)]

use async_trait::async_trait;
use component_controller::backend::{from_dynamic, to_dynamic, ClusterBackend, InMemoryBackend};
use component_controller::controller::phases::{PhaseKind, DEFAULT_PHASES, DEPENDENCY_PHASES};
use component_controller::controller::reconciler::{
    reconcile_component, ComponentReconciler, ControllerContext, Mutation, ReconcileContext,
    ReconcileOutcome, ReconcilerError,
};
use component_controller::crd::{
    Component, ComponentStatus, PhaseCondition, PhaseState, ResourceIdentity, WebStore,
    WebStoreSpec,
};
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::CustomResource;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

pub const NAMESPACE: &str = "shop";

/// In-memory cluster plus a controller context bound to it
#[derive(Debug)]
pub struct TestCluster {
    pub backend: InMemoryBackend,
    pub ctx: ControllerContext,
}

impl TestCluster {
    pub fn new() -> Self {
        let backend = InMemoryBackend::new();
        let shared: Arc<dyn ClusterBackend> = Arc::new(backend.clone());
        Self {
            backend,
            ctx: ControllerContext::with_backend(shared),
        }
    }

    /// Cluster with an Active namespace already present
    pub async fn with_namespace() -> Self {
        let cluster = Self::new();
        cluster.seed_namespace(NAMESPACE, "Active").await;
        cluster
    }

    pub async fn seed_namespace(&self, name: &str, phase: &str) {
        let namespace: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": name },
            "status": { "phase": phase }
        }))
        .unwrap();
        self.backend.insert(namespace).await.unwrap();
    }

    /// Store a component and return the stored copy (uid and resourceVersion set)
    pub async fn seed<C: Component>(&self, component: &C) -> C {
        let stored = self
            .backend
            .insert(to_dynamic(component).unwrap())
            .await
            .unwrap();
        from_dynamic(&stored).unwrap()
    }

    /// Latest stored copy of a component
    pub async fn fetch<C: Component>(&self, component: &C) -> C {
        let object = self
            .backend
            .get(&component.identity())
            .await
            .unwrap()
            .expect("component should be stored");
        from_dynamic(&object).unwrap()
    }

    /// Run one pass against the latest stored copy
    pub async fn pass<R: ComponentReconciler>(
        &self,
        component: &R::Component,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let latest = self.fetch(component).await;
        reconcile_component::<R>(latest, &self.ctx).await
    }

    /// Build a reconciler for direct use of its hooks
    pub fn reconciler<R: ComponentReconciler>(&self, component: R::Component) -> R {
        let context = ReconcileContext::new(
            &component,
            &self.ctx,
            uuid::Uuid::new_v4(),
            tracing::Span::none(),
        );
        R::build(component, context)
    }

    pub async fn count(&self, kind: &str) -> usize {
        self.backend.objects_of_kind(kind).await.len()
    }

    pub async fn get(&self, identity: &ResourceIdentity) -> Option<DynamicObject> {
        self.backend.get(identity).await.unwrap()
    }

    /// Assign a cluster IP the way the API server would on Service creation
    pub async fn allocate_cluster_ip(&self, name: &str) {
        self.backend
            .edit(&service(name), |object| {
                object.data["spec"]["clusterIP"] = json!("10.96.0.10");
                object.data["spec"]["clusterIPs"] = json!(["10.96.0.10"]);
            })
            .await
            .unwrap();
    }

    /// Report a Deployment as fully rolled out at its current generation
    pub async fn roll_out_deployment(&self, name: &str, replicas: i32) {
        let identity = deployment(name);
        let stored = self.get(&identity).await.expect("deployment should exist");
        let generation = stored.metadata.generation.unwrap_or(1);
        self.backend
            .set_observed_status(
                &identity,
                json!({
                    "observedGeneration": generation,
                    "replicas": replicas,
                    "readyReplicas": replicas,
                    "updatedReplicas": replicas,
                    "availableReplicas": replicas
                }),
            )
            .await
            .unwrap();
    }
}

pub fn webstore() -> WebStore {
    let mut store = WebStore::new("storefront", WebStoreSpec::default());
    store.metadata.namespace = Some(NAMESPACE.to_string());
    store
}

pub fn deployment(name: &str) -> ResourceIdentity {
    ResourceIdentity::new("apps", "v1", "Deployment", NAMESPACE, name)
}

pub fn service(name: &str) -> ResourceIdentity {
    ResourceIdentity::new("", "v1", "Service", NAMESPACE, name)
}

pub fn ingress(name: &str) -> ResourceIdentity {
    ResourceIdentity::new("networking.k8s.io", "v1", "Ingress", NAMESPACE, name)
}

pub fn job(name: &str) -> ResourceIdentity {
    ResourceIdentity::new("batch", "v1", "Job", NAMESPACE, name)
}

pub fn config_map(name: &str) -> ResourceIdentity {
    ResourceIdentity::new("", "v1", "ConfigMap", NAMESPACE, name)
}

pub fn condition<'a>(status: &'a ComponentStatus, phase: PhaseKind) -> &'a PhaseCondition {
    status
        .phase_condition(phase.name())
        .unwrap_or_else(|| panic!("missing condition for {}", phase.name()))
}

pub fn assert_state(status: &ComponentStatus, phase: PhaseKind, state: PhaseState) {
    assert_eq!(
        condition(status, phase).state,
        state,
        "unexpected state for {}: {:?}",
        phase.name(),
        condition(status, phase)
    );
}

/// A one-shot batch workload: settings ConfigMaps plus a migration Job
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "BatchRun",
    group = "batch.acme.com",
    version = "v1alpha1",
    namespaced,
    status = "ComponentStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BatchRunSpec {
    pub image: String,
    /// One settings ConfigMap per environment; none when empty
    #[serde(default)]
    pub environments: Vec<String>,
    /// ConfigMap that must exist before anything is created
    #[serde(default)]
    pub requires: Option<String>,
    /// Keys every settings ConfigMap must carry before the run is ready
    #[serde(default)]
    pub required_settings: Vec<String>,
}

impl Component for BatchRun {
    fn status(&self) -> Option<&ComponentStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut ComponentStatus {
        self.status.get_or_insert_with(ComponentStatus::default)
    }
}

pub fn batch_run(environments: &[&str]) -> BatchRun {
    let mut run = BatchRun::new(
        "nightly",
        BatchRunSpec {
            image: "migrate:1.0".to_string(),
            environments: environments.iter().map(ToString::to_string).collect(),
            requires: None,
            required_settings: Vec::new(),
        },
    );
    run.metadata.namespace = Some(NAMESPACE.to_string());
    run
}

#[derive(Debug)]
pub struct BatchRunReconciler {
    component: BatchRun,
    context: ReconcileContext,
}

#[async_trait]
impl ComponentReconciler for BatchRunReconciler {
    type Component = BatchRun;

    fn build(component: BatchRun, context: ReconcileContext) -> Self {
        Self { component, context }
    }

    fn component(&self) -> &BatchRun {
        &self.component
    }

    fn component_mut(&mut self) -> &mut BatchRun {
        &mut self.component
    }

    fn context(&self) -> &ReconcileContext {
        &self.context
    }

    fn context_mut(&mut self) -> &mut ReconcileContext {
        &mut self.context
    }

    fn phases(&self) -> &'static [PhaseKind] {
        if self.component.spec.requires.is_some() {
            DEPENDENCY_PHASES
        } else {
            DEFAULT_PHASES
        }
    }

    fn child_kinds() -> Vec<GroupVersionKind> {
        vec![
            GroupVersionKind::gvk("", "v1", "ConfigMap"),
            GroupVersionKind::gvk("batch", "v1", "Job"),
        ]
    }

    fn construct_resources(&self) -> anyhow::Result<Vec<DynamicObject>> {
        let namespace = self.component.namespace().unwrap_or_default();
        let settings = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "settings", "namespace": namespace },
            "data": { "image": self.component.spec.image }
        });
        let job = json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": { "name": "migrate", "namespace": namespace },
            "spec": {
                "template": {
                    "spec": {
                        "restartPolicy": "Never",
                        "containers": [{ "name": "migrate", "image": self.component.spec.image }]
                    }
                }
            }
        });
        Ok(vec![
            serde_json::from_value(settings)?,
            serde_json::from_value(job)?,
        ])
    }

    fn mutate(&self, object: DynamicObject) -> anyhow::Result<Mutation> {
        if object.types.as_ref().is_some_and(|t| t.kind != "ConfigMap") {
            return Ok(Mutation::Replace(vec![object]));
        }
        if self.component.spec.environments.is_empty() {
            return Ok(Mutation::Skip);
        }
        let base_name = object.name_any();
        Ok(Mutation::Replace(
            self.component
                .spec
                .environments
                .iter()
                .map(|env| {
                    let mut copy = object.clone();
                    copy.metadata.name = Some(format!("{base_name}-{env}"));
                    copy
                })
                .collect(),
        ))
    }

    fn expected_keys(&self, identity: &ResourceIdentity) -> Vec<String> {
        if identity.kind == "ConfigMap" && identity.name.starts_with("settings") {
            self.component.spec.required_settings.clone()
        } else {
            Vec::new()
        }
    }

    async fn check_dependencies(&self) -> anyhow::Result<bool> {
        let Some(required) = &self.component.spec.requires else {
            return Ok(true);
        };
        Ok(self.client().get(&config_map(required)).await?.is_some())
    }
}

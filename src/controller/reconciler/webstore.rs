//! # WebStore Reconciler
//!
//! Drives a `WebStore` to a Deployment, a Service and an Ingress in the
//! component's namespace. The Ingress is held back until its Service is ready.

use crate::controller::reconciler::traits::ComponentReconciler;
use crate::controller::reconciler::types::ReconcileContext;
use crate::crd::{ResourceIdentity, WebStore};
use anyhow::Context;
use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::ResourceExt;
use serde_json::{json, Value};
use tracing::debug;

pub const DEPLOYMENT_NAME: &str = "webstore-deploy";
pub const INGRESS_NAME: &str = "webstore-ing";
pub const APP_LABEL: &str = "webstore";
pub const INGRESS_HOST: &str = "app.acme.com";
const CONTAINER_NAME: &str = "webstore-container";
const CONTAINER_PORT: i32 = 8080;
const SERVICE_PORT: i32 = 80;

#[derive(Debug)]
pub struct WebStoreReconciler {
    component: WebStore,
    context: ReconcileContext,
}

impl WebStoreReconciler {
    fn namespace(&self) -> String {
        self.component.namespace().unwrap_or_default()
    }

    fn deployment(&self) -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": DEPLOYMENT_NAME,
                "namespace": self.namespace(),
            },
            "spec": {
                "replicas": self.component.spec.web_store_replicas,
                "selector": { "matchLabels": { "app": APP_LABEL } },
                "template": {
                    "metadata": { "labels": { "app": APP_LABEL } },
                    "spec": {
                        "containers": [{
                            "name": CONTAINER_NAME,
                            "image": self.component.spec.webstore_image,
                            "ports": [{ "containerPort": CONTAINER_PORT }],
                        }],
                    },
                },
            },
        })
    }

    fn service(&self) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {
                "name": self.component.spec.service_name,
                "namespace": self.namespace(),
            },
            "spec": {
                "selector": { "app": APP_LABEL },
                "ports": [{
                    "protocol": "TCP",
                    "port": SERVICE_PORT,
                    "targetPort": CONTAINER_PORT,
                }],
            },
        })
    }

    fn ingress(&self) -> Value {
        json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "Ingress",
            "metadata": {
                "name": INGRESS_NAME,
                "namespace": self.namespace(),
                "annotations": { "nginx.ingress.kubernetes.io/rewrite-target": "/" },
            },
            "spec": {
                "rules": [{
                    "host": INGRESS_HOST,
                    "http": {
                        "paths": [{
                            "path": "/",
                            "pathType": "Prefix",
                            "backend": {
                                "service": {
                                    "name": self.component.spec.service_name,
                                    "port": { "number": SERVICE_PORT },
                                },
                            },
                        }],
                    },
                }],
            },
        })
    }

    fn service_identity(&self) -> ResourceIdentity {
        ResourceIdentity::new(
            "",
            "v1",
            "Service",
            self.namespace(),
            self.component.spec.service_name.clone(),
        )
    }
}

#[async_trait]
impl ComponentReconciler for WebStoreReconciler {
    type Component = WebStore;

    fn build(component: WebStore, context: ReconcileContext) -> Self {
        Self { component, context }
    }

    fn component(&self) -> &WebStore {
        &self.component
    }

    fn component_mut(&mut self) -> &mut WebStore {
        &mut self.component
    }

    fn context(&self) -> &ReconcileContext {
        &self.context
    }

    fn context_mut(&mut self) -> &mut ReconcileContext {
        &mut self.context
    }

    fn child_kinds() -> Vec<GroupVersionKind> {
        vec![
            GroupVersionKind::gvk("apps", "v1", "Deployment"),
            GroupVersionKind::gvk("", "v1", "Service"),
            GroupVersionKind::gvk("networking.k8s.io", "v1", "Ingress"),
        ]
    }

    fn construct_resources(&self) -> anyhow::Result<Vec<DynamicObject>> {
        // Service before Ingress so the Ingress wait can be satisfied in one pass
        [self.deployment(), self.service(), self.ingress()]
            .into_iter()
            .map(|value| {
                serde_json::from_value(value).context("unable to build WebStore child resource")
            })
            .collect()
    }

    async fn pre_flight(&self) -> anyhow::Result<bool> {
        let spec = &self.component.spec;
        if spec.web_store_replicas < 0 {
            anyhow::bail!("webStoreReplicas must not be negative, got {}", spec.web_store_replicas);
        }
        if spec.service_name.is_empty() {
            anyhow::bail!("serviceName must not be empty");
        }
        if spec.webstore_image.is_empty() {
            anyhow::bail!("webstoreImage must not be empty");
        }
        Ok(true)
    }

    async fn wait(&self, resource: &ResourceIdentity) -> anyhow::Result<bool> {
        if resource.kind != "Ingress" {
            return Ok(true);
        }
        let service = self.service_identity();
        let ready = self.readiness().is_ready(self.client(), &service).await?;
        if !ready {
            debug!(parent: self.logger(), service = %service, "holding ingress until service is ready");
        }
        Ok(ready)
    }
}

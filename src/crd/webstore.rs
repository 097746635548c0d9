//! # WebStore Spec
//!
//! Sample component: a web store made of a Deployment, a Service and an Ingress.

use crate::crd::component::Component;
use crate::crd::status::ComponentStatus;
use serde::{Deserialize, Serialize};

/// WebStore Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: apps.acme.com/v1alpha1
/// kind: WebStore
/// metadata:
///   name: webstore-sample
///   namespace: shop
/// spec:
///   webstoreImage: nginx:1.17
///   serviceName: webstore-svc
///   webStoreReplicas: 2
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "WebStore",
    group = "apps.acme.com",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::ComponentStatus",
    shortname = "ws",
    printcolumn = r#"{"name":"Ready", "type":"boolean", "jsonPath":".status.ready"}, {"name":"Replicas", "type":"integer", "jsonPath":".spec.webStoreReplicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WebStoreSpec {
    /// Container image served by the store Deployment
    #[serde(default = "default_webstore_image")]
    pub webstore_image: String,
    /// Name of the Service fronting the store
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_webstore_replicas")]
    pub web_store_replicas: i32,
}

impl Default for WebStoreSpec {
    fn default() -> Self {
        Self {
            webstore_image: default_webstore_image(),
            service_name: default_service_name(),
            web_store_replicas: default_webstore_replicas(),
        }
    }
}

impl Component for WebStore {
    fn status(&self) -> Option<&ComponentStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut ComponentStatus {
        self.status.get_or_insert_with(ComponentStatus::default)
    }
}

pub fn default_webstore_image() -> String {
    "nginx:1.17".to_string()
}

pub fn default_service_name() -> String {
    "webstore-svc".to_string()
}

pub fn default_webstore_replicas() -> i32 {
    2
}

//! # Core Readiness
//!
//! Readiness rules for core/v1 kinds.

use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, Service};

const SERVICE_TYPE_EXTERNAL_NAME: &str = "ExternalName";
const SERVICE_TYPE_LOAD_BALANCER: &str = "LoadBalancer";
const CLUSTER_IP_NONE: &str = "None";

/// Ready once the Service has what its type needs to route traffic.
///
/// ExternalName services are always ready. Headless services need no IP.
/// LoadBalancer services also need at least one ingress entry.
#[must_use]
pub fn service_is_ready(service: &Service) -> bool {
    let spec = service.spec.as_ref();
    let service_type = spec.and_then(|s| s.type_.as_deref());
    if service_type == Some(SERVICE_TYPE_EXTERNAL_NAME) {
        return true;
    }

    let cluster_ip = spec.and_then(|s| s.cluster_ip.as_deref()).unwrap_or_default();
    if cluster_ip != CLUSTER_IP_NONE && cluster_ip.is_empty() {
        return false;
    }

    if service_type == Some(SERVICE_TYPE_LOAD_BALANCER) {
        let ingress_count = service
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .map_or(0, Vec::len);
        if ingress_count == 0 {
            return false;
        }
    }

    true
}

#[must_use]
pub fn namespace_is_ready(namespace: &Namespace) -> bool {
    match namespace.status.as_ref().and_then(|s| s.phase.as_deref()) {
        Some("Terminating") => false,
        Some("Active") => true,
        _ => false,
    }
}

/// Ready when every expected key holds a non-empty value
#[must_use]
pub fn config_map_is_ready(config_map: &ConfigMap, expected_keys: &[String]) -> bool {
    expected_keys.iter().all(|key| {
        config_map
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .is_some_and(|value| !value.is_empty())
    })
}

/// Ready when every expected key holds a non-empty value
#[must_use]
pub fn secret_is_ready(secret: &Secret, expected_keys: &[String]) -> bool {
    expected_keys.iter().all(|key| {
        secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .is_some_and(|value| !value.0.is_empty())
    })
}

//! # Types
//!
//! Core types for the reconciler.

use crate::backend::ClusterBackend;
use crate::config::{ControllerConfig, SharedControllerConfig};
use crate::controller::rate_limiter::DefaultRateLimiter;
use crate::controller::readiness::ReadinessRegistry;
use crate::crd::{Component, ComponentStatus, ResourceIdentity};
use kube::api::DynamicObject;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
    #[error("Reconciliation cancelled")]
    Cancelled,
}

/// What the scheduler should do with a request after a reconcile pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing left to do until the component or a child changes
    Done,
    /// Try again after the rate limiter's delay for this component
    Requeue,
    /// Try again after a fixed delay
    RequeueAfter(Duration),
}

impl ReconcileOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Done => "done",
            ReconcileOutcome::Requeue => "requeue",
            ReconcileOutcome::RequeueAfter(_) => "requeue-after",
        }
    }
}

/// State shared by every reconcile of one controller
pub struct ControllerContext {
    pub backend: Arc<dyn ClusterBackend>,
    pub readiness: Arc<ReadinessRegistry>,
    /// One limiter per controller, keyed by `namespace/name`
    pub rate_limiter: DefaultRateLimiter<String>,
    /// Cancelled on shutdown; every reconcile runs under a child token
    pub shutdown: CancellationToken,
    pub config: SharedControllerConfig,
}

impl std::fmt::Debug for ControllerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerContext")
            .field("backend", &self.backend)
            .field("tracked_items", &self.rate_limiter.tracked_items())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ControllerContext {
    /// Context with the default readiness probes and a limiter built from `config`
    pub fn new(backend: Arc<dyn ClusterBackend>, config: SharedControllerConfig) -> Self {
        let rate_limiter =
            DefaultRateLimiter::new(config.rate_limit_base_delay(), config.rate_limit_max_delay());
        Self {
            backend,
            readiness: Arc::new(ReadinessRegistry::default()),
            rate_limiter,
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Context with default configuration
    pub fn with_backend(backend: Arc<dyn ClusterBackend>) -> Self {
        Self::new(backend, Arc::new(ControllerConfig::default()))
    }

    #[must_use]
    pub fn with_readiness(mut self, readiness: ReadinessRegistry) -> Self {
        self.readiness = Arc::new(readiness);
        self
    }
}

/// Request-scoped state of one reconcile pass
pub struct ReconcileContext {
    /// Identity of the component being reconciled
    pub request: ResourceIdentity,
    pub reconcile_id: Uuid,
    pub span: tracing::Span,
    pub cancellation: CancellationToken,
    pub backend: Arc<dyn ClusterBackend>,
    pub readiness: Arc<ReadinessRegistry>,
    /// Child objects built during CreateResources
    pub children: Vec<DynamicObject>,
    /// Status as last read from or written to the backend
    pub persisted_status: Option<ComponentStatus>,
}

impl std::fmt::Debug for ReconcileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileContext")
            .field("request", &self.request)
            .field("reconcile_id", &self.reconcile_id)
            .field("children", &self.children.len())
            .finish_non_exhaustive()
    }
}

impl ReconcileContext {
    pub fn new<C: Component>(
        component: &C,
        controller: &ControllerContext,
        reconcile_id: Uuid,
        span: tracing::Span,
    ) -> Self {
        Self {
            request: component.identity(),
            reconcile_id,
            span,
            cancellation: controller.shutdown.child_token(),
            backend: Arc::clone(&controller.backend),
            readiness: Arc::clone(&controller.readiness),
            children: Vec::new(),
            persisted_status: component.status().cloned(),
        }
    }
}

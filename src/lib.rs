//! # Component Controller
//!
//! A phase-based reconciliation engine for Kubernetes components.
//!
//! A component is a custom resource whose spec describes a set of child
//! objects. Each reconcile pass runs an ordered list of phases against it:
//!
//! 1. **PreFlight** - structural checks before anything is written
//! 2. **CreateResources** - construct every child, then wait for and persist each one
//! 3. **CheckReady** - every child passes its kind's readiness probe
//! 4. **Complete** - mark the component ready
//!
//! Each phase leaves one condition on the component status, and each child
//! leaves one resource entry. Optimistic-lock conflicts are absorbed and
//! retried on the next pass. Requeue delays come from a per-controller
//! exponential rate limiter.
//!
//! ## Modules
//!
//! - `backend`: Cluster access behind the `ClusterBackend` trait (kube-rs and in-memory)
//! - `config`: Environment-driven configuration
//! - `constants`: Defaults and condition messages
//! - `controller`: Phases, readiness probes, rate limiter, reconciler and HTTP server
//! - `crd`: Status types, the `Component` trait and the `WebStore` resource
//! - `observability`: Prometheus metrics
//! - `runtime`: Initialization and the watch loop

pub mod backend;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;

pub use backend::{BackendError, ClusterBackend, InMemoryBackend, KubeBackend};
pub use controller::phases::{execute_phases, PhaseKind, ResourcePhaseKind};
pub use controller::reconciler::{
    reconcile, reconcile_component, ComponentReconciler, ControllerContext, ReconcileOutcome,
    ReconcilerError,
};
pub use crd::{Component, ComponentStatus, PhaseCondition, PhaseState, Resource, ResourceIdentity};

//! # Observability
//!
//! Prometheus metrics for the reconcile loop, served by the HTTP server.

pub mod metrics;

pub use metrics::*;

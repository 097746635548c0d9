//! # Controller
//!
//! Core controller modules for the component controller.
//!
//! - `phases`: Component and resource phase machines
//! - `rate_limiter`: Per-item exponential requeue delays
//! - `readiness`: Kind-specific readiness probes
//! - `reconciler`: Reconciler capability trait and entry point
//! - `server`: HTTP server for metrics and health checks

pub mod phases;
pub mod rate_limiter;
pub mod readiness;
pub mod reconciler;
pub mod server;

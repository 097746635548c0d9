//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `component_controller_reconciliations_total` - Total number of reconciliations
//! - `component_controller_reconciliation_errors_total` - Total number of reconciliation errors
//! - `component_controller_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `component_controller_requeues_total` - Requeues scheduled, by reason
//! - `component_controller_phase_outcomes_total` - Phase exits, by phase and resulting state
//! - `component_controller_optimistic_lock_conflicts_total` - Conflicts absorbed by the phase engine
//! - `component_controller_child_resources_persisted_total` - Child writes, by kind

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "component_controller_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "component_controller_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "component_controller_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "component_controller_requeues_total",
            "Total number of requeues scheduled by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static PHASE_OUTCOMES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "component_controller_phase_outcomes_total",
            "Total number of phase exits by phase and state",
        ),
        &["phase", "state"],
    )
    .expect("Failed to create PHASE_OUTCOMES_TOTAL metric - this should never happen")
});

static OPTIMISTIC_LOCK_CONFLICTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "component_controller_optimistic_lock_conflicts_total",
        "Total number of optimistic lock conflicts absorbed",
    )
    .expect("Failed to create OPTIMISTIC_LOCK_CONFLICTS_TOTAL metric - this should never happen")
});

static CHILD_RESOURCES_PERSISTED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "component_controller_child_resources_persisted_total",
            "Total number of child resources created or updated by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create CHILD_RESOURCES_PERSISTED_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PHASE_OUTCOMES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(OPTIMISTIC_LOCK_CONFLICTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CHILD_RESOURCES_PERSISTED_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_phase_outcome(phase: &str, state: &str) {
    PHASE_OUTCOMES_TOTAL.with_label_values(&[phase, state]).inc();
}

pub fn increment_optimistic_lock_conflicts() {
    OPTIMISTIC_LOCK_CONFLICTS_TOTAL.inc();
}

pub fn increment_child_resources_persisted(kind: &str) {
    CHILD_RESOURCES_PERSISTED_TOTAL.with_label_values(&[kind]).inc();
}

//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `gitops_reconciliations_total` - Total number of reconciliation passes
//! - `gitops_reconciliation_errors_total{kind}` - Failed passes by error kind
//! - `gitops_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `gitops_resources_applied_total{operation}` - Target resources created, updated or unchanged
//! - `gitops_resources_pruned_total` - Orphaned resources deleted
//! - `gitops_prune_errors_total` - Orphan deletions that failed and were retained
//! - `gitops_source_fetch_total` - Manifest fetches
//! - `gitops_source_fetch_errors_total` - Failed manifest fetches
//! - `gitops_source_fetch_duration_seconds` - Duration of manifest fetches
//! - `gitops_requeues_total{reason}` - Requeues by reason

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gitops_reconciliations_total",
        "Total number of reconciliation passes",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gitops_reconciliation_errors_total",
            "Total number of failed reconciliation passes by error kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "gitops_reconciliation_duration_seconds",
            "Duration of reconciliation passes in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static RESOURCES_APPLIED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gitops_resources_applied_total",
            "Total number of target resources applied by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create RESOURCES_APPLIED_TOTAL metric - this should never happen")
});

static RESOURCES_PRUNED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gitops_resources_pruned_total",
        "Total number of orphaned resources deleted",
    )
    .expect("Failed to create RESOURCES_PRUNED_TOTAL metric - this should never happen")
});

static PRUNE_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gitops_prune_errors_total",
        "Total number of orphan deletions that failed",
    )
    .expect("Failed to create PRUNE_ERRORS_TOTAL metric - this should never happen")
});

static SOURCE_FETCH_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("gitops_source_fetch_total", "Total number of manifest fetches")
        .expect("Failed to create SOURCE_FETCH_TOTAL metric - this should never happen")
});

static SOURCE_FETCH_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gitops_source_fetch_errors_total",
        "Total number of failed manifest fetches",
    )
    .expect("Failed to create SOURCE_FETCH_ERRORS_TOTAL metric - this should never happen")
});

static SOURCE_FETCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "gitops_source_fetch_duration_seconds",
            "Duration of manifest fetches in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create SOURCE_FETCH_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gitops_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(RESOURCES_APPLIED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESOURCES_PRUNED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PRUNE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SOURCE_FETCH_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SOURCE_FETCH_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SOURCE_FETCH_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_resources_applied(operation: &str) {
    RESOURCES_APPLIED_TOTAL.with_label_values(&[operation]).inc();
}

pub fn increment_resources_pruned() {
    RESOURCES_PRUNED_TOTAL.inc();
}

pub fn increment_prune_errors() {
    PRUNE_ERRORS_TOTAL.inc();
}

pub fn increment_source_fetch_total() {
    SOURCE_FETCH_TOTAL.inc();
}

pub fn increment_source_fetch_errors_total() {
    SOURCE_FETCH_ERRORS_TOTAL.inc();
}

pub fn observe_source_fetch_duration(duration: f64) {
    SOURCE_FETCH_DURATION.observe(duration);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        let after = RECONCILIATIONS_TOTAL.get();
        assert!(after > before);
    }

    #[test]
    fn test_increment_reconciliation_errors_by_kind() {
        let before = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["source-unavailable"])
            .get();
        increment_reconciliation_errors("source-unavailable");
        let after = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["source-unavailable"])
            .get();
        assert!(after > before);
    }

    #[test]
    fn test_observe_durations() {
        observe_reconciliation_duration(1.5);
        observe_source_fetch_duration(0.2);
        // Just verify it doesn't panic
    }

    #[test]
    fn test_increment_resources_applied() {
        let before = RESOURCES_APPLIED_TOTAL.with_label_values(&["created"]).get();
        increment_resources_applied("created");
        let after = RESOURCES_APPLIED_TOTAL.with_label_values(&["created"]).get();
        assert!(after > before);
    }

    #[test]
    fn test_increment_prune_counters() {
        let pruned = RESOURCES_PRUNED_TOTAL.get();
        let errors = PRUNE_ERRORS_TOTAL.get();
        increment_resources_pruned();
        increment_prune_errors();
        assert!(RESOURCES_PRUNED_TOTAL.get() > pruned);
        assert!(PRUNE_ERRORS_TOTAL.get() > errors);
    }

    #[test]
    fn test_increment_requeues_total() {
        let before = REQUEUES_TOTAL.with_label_values(&["timer-based"]).get();
        increment_requeues_total("timer-based");
        let after = REQUEUES_TOTAL.with_label_values(&["timer-based"]).get();
        assert!(after > before);
    }
}

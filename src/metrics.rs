// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the CDI operator.
//!
//! All metrics carry the namespace prefix `cdi_kubevirt_io_` (prometheus-safe version
//! of "cdi.kubevirt.io") and are served on `/metrics`.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - reconciliations of the `CDI` resource and their outcomes
//! - **Resource Lifecycle Metrics** - objects created, updated and deleted by kind
//! - **Certificate Metrics** - signer and leaf certificate rotations
//! - **Error Metrics** - errors by kind and category
//!
//! # Example
//!
//! ```rust,no_run
//! use cdi_operator::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("CDI", std::time::Duration::from_secs(1));
//! ```

use crate::constants::{HEALTH_SERVER_PATH, METRICS_SERVER_PATH};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all CDI operator metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "cdi_kubevirt_io";

/// Phases tracked by [`INSTALL_PHASE`].
const PHASES: [&str; 5] = ["Deploying", "Deployed", "Deleting", "Deleted", "Error"];

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Metric definitions are static and unique, so registration cannot fail.
fn register<C>(collector: C) -> C
where
    C: prometheus::core::Collector + Clone + 'static,
{
    METRICS_REGISTRY
        .register(Box::new(collector.clone()))
        .expect("metric registered twice");
    collector
}

fn counter(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let opts = Opts::new(format!("{METRICS_NAMESPACE}_{name}"), help);
    register(CounterVec::new(opts, labels).expect("valid counter definition"))
}

fn gauge(name: &str, help: &str, labels: &[&str]) -> GaugeVec {
    let opts = Opts::new(format!("{METRICS_NAMESPACE}_{name}"), help);
    register(GaugeVec::new(opts, labels).expect("valid gauge definition"))
}

// ----------------------------------------------------------------------------
// Reconciliation
// ----------------------------------------------------------------------------

/// Reconciliations by resource type and outcome (`success`, `error`, `requeue`).
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter(
        "reconciliations_total",
        "Total number of reconciliations by resource type and status",
        &["resource_type", "status"],
    )
});

pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by resource type",
    )
    .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    register(HistogramVec::new(opts, &["resource_type"]).expect("valid histogram definition"))
});

/// Requeues by reason, e.g. `owner_gone` or `uninstall_blocked`.
pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter(
        "requeues_total",
        "Total number of requeue operations by resource type and reason",
        &["resource_type", "reason"],
    )
});

/// 1 for the current installation phase, 0 for the others.
pub static INSTALL_PHASE: LazyLock<GaugeVec> = LazyLock::new(|| {
    gauge(
        "install_phase",
        "Current phase of the CDI installation (1 = current)",
        &["phase"],
    )
});

// ----------------------------------------------------------------------------
// Owned objects
// ----------------------------------------------------------------------------

/// Owned objects written or removed, by kind and operation.
pub static RESOURCE_OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter(
        "resource_operations_total",
        "Total number of owned objects created, updated or deleted by kind",
        &["kind", "operation"],
    )
});

// ----------------------------------------------------------------------------
// Certificates and errors
// ----------------------------------------------------------------------------

/// Certificate rotations by secret name and `signer` or `target`.
pub static CERTIFICATE_ROTATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter(
        "certificate_rotations_total",
        "Total number of certificate rotations by secret and kind",
        &["secret", "kind"],
    )
});

pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter(
        "errors_total",
        "Total number of errors by resource type and error category",
        &["resource_type", "error_type"],
    )
});

fn observe_reconciliation(resource_type: &str, outcome: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, outcome])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a successful reconciliation
pub fn record_reconciliation_success(resource_type: &str, duration: Duration) {
    observe_reconciliation(resource_type, "success", duration);
}

/// Record a failed reconciliation
pub fn record_reconciliation_error(resource_type: &str, duration: Duration) {
    observe_reconciliation(resource_type, "error", duration);
}

/// Record a requeue that was not caused by an error.
pub fn record_reconciliation_requeue(resource_type: &str, reason: &str) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "requeue"])
        .inc();
    REQUEUE_TOTAL
        .with_label_values(&[resource_type, reason])
        .inc();
}

/// Record the current installation phase, clearing the others.
pub fn record_phase(phase: &str) {
    for candidate in PHASES {
        let value = if candidate == phase { 1.0 } else { 0.0 };
        INSTALL_PHASE.with_label_values(&[candidate]).set(value);
    }
}

pub fn record_resource_created(kind: &str) {
    RESOURCE_OPERATIONS_TOTAL
        .with_label_values(&[kind, "create"])
        .inc();
}

pub fn record_resource_updated(kind: &str) {
    RESOURCE_OPERATIONS_TOTAL
        .with_label_values(&[kind, "update"])
        .inc();
}

pub fn record_resource_deleted(kind: &str) {
    RESOURCE_OPERATIONS_TOTAL
        .with_label_values(&[kind, "delete"])
        .inc();
}

/// Record a certificate rotation; `kind` is `signer` or `target`.
pub fn record_certificate_rotation(secret: &str, kind: &str) {
    CERTIFICATE_ROTATIONS_TOTAL
        .with_label_values(&[secret, kind])
        .inc();
}

/// Record an error of the given category (`converge`, `scc`, ...).
pub fn record_error(resource_type: &str, error_type: &str) {
    ERRORS_TOTAL
        .with_label_values(&[resource_type, error_type])
        .inc();
}

/// Encode the registry in the Prometheus text format.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&METRICS_REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

/// `GET /metrics`
pub async fn metrics_handler() -> impl IntoResponse {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            e.to_string(),
        ),
    }
}

/// `GET /healthz`
pub async fn health_handler() -> &'static str {
    "ok"
}

/// Router serving metrics and the liveness probe.
pub fn router() -> Router {
    Router::new()
        .route(METRICS_SERVER_PATH, get(metrics_handler))
        .route(HEALTH_SERVER_PATH, get(health_handler))
}

//! Prometheus metrics for the canary controller
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `meshsplit_reconciliations_total` | Counter | `result` |
//! | `meshsplit_reconciliation_duration_seconds` | Histogram | `result` |
//! | `meshsplit_router_operations_total` | Counter | `operation`, `result` |

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use thiserror::Error;

/// Buckets for reconciliation latency in seconds
pub const RECONCILE_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0];

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encoding(String),
}

/// Controller metrics backed by a private registry
pub struct ControllerMetrics {
    registry: Registry,
    reconciliations_total: CounterVec,
    reconciliation_duration: HistogramVec,
    router_operations_total: CounterVec,
}

pub type SharedMetrics = Arc<ControllerMetrics>;

impl ControllerMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let reconciliations_total = CounterVec::new(
            Opts::new(
                "meshsplit_reconciliations_total",
                "Canary reconciliations by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(reconciliations_total.clone()))?;

        let reconciliation_duration = HistogramVec::new(
            HistogramOpts::new(
                "meshsplit_reconciliation_duration_seconds",
                "Time spent reconciling a Canary",
            )
            .buckets(RECONCILE_BUCKETS.to_vec()),
            &["result"],
        )?;
        registry.register(Box::new(reconciliation_duration.clone()))?;

        let router_operations_total = CounterVec::new(
            Opts::new(
                "meshsplit_router_operations_total",
                "Mesh router calls by operation and result",
            ),
            &["operation", "result"],
        )?;
        registry.register(Box::new(router_operations_total.clone()))?;

        Ok(Self {
            registry,
            reconciliations_total,
            reconciliation_duration,
            router_operations_total,
        })
    }

    pub fn record_reconciliation_success(&self, duration_secs: f64) {
        self.record_reconciliation("success", duration_secs);
    }

    pub fn record_reconciliation_error(&self, duration_secs: f64) {
        self.record_reconciliation("error", duration_secs);
    }

    fn record_reconciliation(&self, result: &str, duration_secs: f64) {
        self.reconciliations_total
            .with_label_values(&[result])
            .inc();
        self.reconciliation_duration
            .with_label_values(&[result])
            .observe(duration_secs);
    }

    /// Count a router call; `ok` selects the `success`/`error` result label
    pub fn record_router_operation(&self, operation: &str, ok: bool) {
        let result = if ok { "success" } else { "error" };
        self.router_operations_total
            .with_label_values(&[operation, result])
            .inc();
    }

    /// Render every registered family in Prometheus text format
    pub fn encode(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

/// Create the shared metrics handle used by the controller and health server
pub fn create_metrics() -> Result<SharedMetrics, MetricsError> {
    Ok(Arc::new(ControllerMetrics::new()?))
}

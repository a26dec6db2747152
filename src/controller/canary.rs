//! Baseline routing for Canary resources
//!
//! Every Canary change (and every change to a VirtualService it owns) runs
//! `MeshRouter::sync`, so the mesh resource exists and its routing metadata
//! tracks the Canary. Weights are left to whoever drives `set_routes`.

use crate::config::RESYNC_INTERVAL;
use crate::crd::canary::Canary;
use crate::router::{MeshRouter, RouterError};
use crate::server::SharedMetrics;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Requeue delay after a failed reconciliation
pub const ERROR_REQUEUE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Routing failed: {0}")]
    Router(#[from] RouterError),
}

pub struct Context {
    pub router: Arc<dyn MeshRouter>,
    /// When Some, records reconciliation and router call metrics
    pub metrics: Option<SharedMetrics>,
}

impl Context {
    pub fn new(router: Arc<dyn MeshRouter>, metrics: Option<SharedMetrics>) -> Self {
        Self { router, metrics }
    }
}

/// Sync the Canary's mesh resource and schedule the next periodic resync
pub async fn reconcile(canary: Arc<Canary>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let name = canary.name_any();
    let namespace = canary.namespace().unwrap_or_default();

    info!(
        canary = %name,
        namespace = %namespace,
        router = ctx.router.name(),
        "Reconciling Canary"
    );

    let result = ctx.router.sync(&canary).await;

    if let Some(metrics) = &ctx.metrics {
        let elapsed = start.elapsed().as_secs_f64();
        metrics.record_router_operation("sync", result.is_ok());
        match result {
            Ok(()) => metrics.record_reconciliation_success(elapsed),
            Err(_) => metrics.record_reconciliation_error(elapsed),
        }
    }

    result?;
    Ok(Action::requeue(RESYNC_INTERVAL))
}

/// Log and retry a failed reconciliation after `ERROR_REQUEUE`
pub fn error_policy(canary: Arc<Canary>, error: &ReconcileError, _ctx: Arc<Context>) -> Action {
    warn!(
        canary = %canary.name_any(),
        namespace = ?canary.namespace(),
        error = %error,
        "Reconcile error (will retry)"
    );
    Action::requeue(ERROR_REQUEUE)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "canary_test.rs"]
mod tests;

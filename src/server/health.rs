//! Health and metrics endpoints for Kubernetes
//!
//! - `/healthz` - Liveness: the process is up
//! - `/readyz` - Readiness: the Canary watch is running
//! - `/metrics` - Prometheus metrics in text format

use crate::server::metrics::SharedMetrics;
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Readiness flag shared between the controller and the probe handler
#[derive(Debug, Clone, Default)]
pub struct ReadinessState {
    ready: Arc<AtomicBool>,
}

impl ReadinessState {
    /// Initially not ready
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Flip back to 503 so the pod is taken out of rotation while draining
    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct ServerState {
    readiness: ReadinessState,
    metrics: SharedMetrics,
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn readyz(State(state): State<ServerState>) -> StatusCode {
    if state.readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics(State(state): State<ServerState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

fn build_router(readiness: ReadinessState, metrics: SharedMetrics) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(self::metrics))
        .with_state(ServerState { readiness, metrics })
}

/// Serve the probe and metrics endpoints over plain HTTP until the task is
/// dropped or the listener fails
pub async fn run_health_server(
    port: u16,
    readiness: ReadinessState,
    metrics: SharedMetrics,
) -> Result<(), std::io::Error> {
    let app = build_router(readiness, metrics);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = %port, "Health and metrics server listening");

    axum::serve(listener, app).await
}

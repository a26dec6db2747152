//! Process plumbing around the controller
//!
//! - Kubernetes probes and Prometheus scraping over HTTP
//! - Graceful shutdown on SIGTERM/SIGINT, also used to cancel router calls

mod health;
pub mod metrics;
pub mod shutdown;

pub use health::{run_health_server, ReadinessState};
pub use metrics::{create_metrics, ControllerMetrics, SharedMetrics};
pub use shutdown::{shutdown_channel, wait_for_signal, ShutdownController, ShutdownSignal};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "health_test.rs"]
mod health_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;

//! meshsplit: primary/canary traffic splitting through the service mesh
//!
//! - `crd`: the Canary resource and the Istio VirtualService subset we write
//! - `router`: the `MeshRouter` contract and its Istio implementation
//! - `controller`: kube-runtime reconciler that keeps baseline routing in sync
//! - `server`: health/metrics endpoints and graceful shutdown
//! - `config`: environment-driven settings

pub mod config;
pub mod controller;
pub mod crd;
pub mod router;
pub mod server;

//! Mesh traffic routing for canaries
//!
//! `MeshRouter` is the contract the rest of the system drives: `sync` makes
//! the mesh resource exist with the declared routing metadata, while
//! `set_routes`/`get_routes` move and read the primary/canary weight split.
//! One implementation exists per mesh backend:
//! - `IstioRouter`: VirtualService with a single two-destination HTTP rule

pub mod client;
pub mod istio;
pub mod retry;

use crate::crd::canary::Canary;
use async_trait::async_trait;
use client::{ClientError, KubeVirtualServiceClient};
use kube::ResourceExt;
use retry::CallLimits;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Weights a freshly created route starts with (primary, canary)
pub const BASELINE_WEIGHTS: (i32, i32) = (100, 0);

/// Destination host of the stable workload, `<target>-primary`
pub fn primary_name(target: &str) -> String {
    format!("{}-primary", target)
}

/// Destination host of the workload under test, `<target>-canary`
pub fn canary_name(target: &str) -> String {
    format!("{}-canary", target)
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("{what} not found for {key}")]
    NotFound { key: String, what: String },

    #[error("Conflicting writes to {key}: gave up after {attempts} attempts")]
    Conflict { key: String, attempts: u32 },

    #[error("Invalid routing rules in {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("{op} on {key} failed: {source}")]
    Backend {
        key: String,
        op: &'static str,
        #[source]
        source: ClientError,
    },

    #[error("{op} on {key} timed out after {after:?}")]
    Timeout {
        key: String,
        op: &'static str,
        after: Duration,
    },

    #[error("{op} on {key} cancelled")]
    Cancelled { key: String, op: &'static str },

    #[error("Canary {0} has no targetRef.name")]
    MissingTargetRef(String),

    #[error("Canary {0} has no namespace")]
    MissingNamespace(String),
}

impl RouterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RouterError::NotFound { .. })
    }
}

/// The mesh resource a canary is routed through
///
/// The resource lives in the canary's namespace and is named after
/// `targetRef.name`; the destination hosts derive from the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub namespace: String,
    pub name: String,
}

impl RouteTarget {
    pub fn from_canary(canary: &Canary) -> Result<Self, RouterError> {
        let namespace = canary
            .namespace()
            .ok_or_else(|| RouterError::MissingNamespace(canary.name_any()))?;
        let name = canary.spec.target_ref.name.trim();
        if name.is_empty() {
            return Err(RouterError::MissingTargetRef(format!(
                "{}/{}",
                namespace,
                canary.name_any()
            )));
        }

        Ok(Self {
            namespace,
            name: name.to_string(),
        })
    }

    /// `namespace/name`, used in logs and errors
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn primary_host(&self) -> String {
        primary_name(&self.name)
    }

    pub fn canary_host(&self) -> String {
        canary_name(&self.name)
    }

    pub(crate) fn backend(&self, op: &'static str, source: ClientError) -> RouterError {
        RouterError::Backend {
            key: self.key(),
            op,
            source,
        }
    }

    pub(crate) fn not_found(&self, what: impl Into<String>) -> RouterError {
        RouterError::NotFound {
            key: self.key(),
            what: what.into(),
        }
    }
}

/// Traffic routing contract shared by every mesh backend
///
/// # Ownership
/// - `sync` owns routing metadata (hosts, gateways, destinations, rule
///   options) and never changes the weights of an existing resource
/// - `set_routes` owns the weights and never changes metadata
///
/// Calls for one canary must be serialized by the caller; calls for distinct
/// canaries may run concurrently.
#[async_trait]
pub trait MeshRouter: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Create the mesh resource with baseline weights, or correct drifted
    /// routing metadata while keeping the current weights
    async fn sync(&self, canary: &Canary) -> Result<(), RouterError>;

    /// Set the primary/canary weights
    ///
    /// The pair is expected to add up to 100; the router does not check.
    async fn set_routes(
        &self,
        canary: &Canary,
        primary_weight: i32,
        canary_weight: i32,
    ) -> Result<(), RouterError>;

    /// Read the current (primary, canary) weights
    async fn get_routes(&self, canary: &Canary) -> Result<(i32, i32), RouterError>;
}

/// Mesh backends the router can be built for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MeshProvider {
    #[default]
    Istio,
}

impl FromStr for MeshProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "istio" => Ok(MeshProvider::Istio),
            other => Err(format!("unsupported mesh provider: {}", other)),
        }
    }
}

impl std::fmt::Display for MeshProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeshProvider::Istio => write!(f, "istio"),
        }
    }
}

/// Build the router for the configured mesh backend
pub fn select_router(
    provider: MeshProvider,
    client: kube::Client,
    limits: CallLimits,
) -> Arc<dyn MeshRouter> {
    match provider {
        MeshProvider::Istio => Arc::new(istio::IstioRouter::new(
            Arc::new(KubeVirtualServiceClient::new(client)),
            limits,
        )),
    }
}

use crate::crd::virtual_service::{HTTPMatchRequest, HTTPRetry, HTTPRewrite};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canary is a Custom Resource describing how a workload is exposed through
/// the mesh while it is progressively delivered
///
/// The router derives the VirtualService and its primary/canary destinations
/// from `targetRef.name`; the `service` block is the routing metadata the
/// router keeps authoritative.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "meshsplit.io",
    version = "v1alpha1",
    kind = "Canary",
    namespaced,
    printcolumn = r#"{"name":"Target", "type":"string", "jsonPath":".spec.targetRef.name"}"#,
    printcolumn = r#"{"name":"Port", "type":"integer", "jsonPath":".spec.service.port"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct CanarySpec {
    /// Workload this canary progressively delivers
    #[serde(rename = "targetRef")]
    pub target_ref: TargetRef,

    /// How the workload is exposed through the mesh
    pub service: CanaryService,
}

/// Reference to the target workload
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct TargetRef {
    #[serde(rename = "apiVersion", skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Workload name; `<name>-primary` and `<name>-canary` are the destinations
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct CanaryService {
    /// Container port both destinations are reached on
    pub port: i32,

    /// External host names, in the order they should appear on the route
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Gateways that front the route
    #[serde(default)]
    pub gateways: Vec<String>,

    /// Match conditions copied onto the HTTP rule
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub match_: Vec<HTTPMatchRequest>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<HTTPRewrite>,

    /// HTTP request timeout (e.g., "10s")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<HTTPRetry>,

    #[serde(rename = "appendHeaders", skip_serializing_if = "Option::is_none")]
    pub append_headers: Option<BTreeMap<String, String>>,
}

#[cfg(test)]
#[path = "canary_test.rs"]
mod tests;

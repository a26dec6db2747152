use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Istio VirtualService (networking.istio.io/v1alpha3)
///
/// Only the subset of the Istio schema that meshsplit reads or writes is
/// modelled. Unknown fields are dropped on update, so the controller must be
/// the sole writer of the routing rules of the VirtualServices it owns.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "networking.istio.io",
    version = "v1alpha3",
    kind = "VirtualService",
    namespaced,
    derive = "PartialEq"
)]
pub struct VirtualServiceSpec {
    /// Destination hosts this VirtualService applies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,

    /// Gateways (and sidecars, via "mesh") that should apply these routes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,

    /// Ordered list of HTTP route rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http: Vec<HTTPRoute>,
}

/// A single HTTP routing rule
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct HTTPRoute {
    /// Conditions that must hold for the rule to apply
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub match_: Vec<HTTPMatchRequest>,

    /// Weighted destinations
    #[serde(default)]
    pub route: Vec<DestinationWeight>,

    /// URI/authority rewrite applied before forwarding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<HTTPRewrite>,

    /// Request timeout (e.g., "5s")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Retry policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<HTTPRetry>,

    /// Headers appended to forwarded requests
    #[serde(rename = "appendHeaders", skip_serializing_if = "Option::is_none")]
    pub append_headers: Option<BTreeMap<String, String>>,
}

/// A destination together with the share of traffic it receives
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct DestinationWeight {
    pub destination: Destination,

    /// Percentage of traffic (0-100)
    #[serde(default)]
    pub weight: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct Destination {
    /// Service registry name of the destination
    pub host: String,

    /// Named subset from a DestinationRule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subset: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSelector>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct PortSelector {
    pub number: i32,
}

/// Request match conditions
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct HTTPMatchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<StringMatch>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<StringMatch>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority: Option<StringMatch>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, StringMatch>>,
}

/// Exactly one of the fields is expected to be set
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct StringMatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct HTTPRewrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct HTTPRetry {
    /// Number of retries for a given request
    pub attempts: i32,

    /// Timeout per retry attempt (e.g., "2s")
    #[serde(rename = "perTryTimeout", skip_serializing_if = "Option::is_none")]
    pub per_try_timeout: Option<String>,
}

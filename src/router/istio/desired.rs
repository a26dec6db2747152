//! Desired VirtualService construction and drift detection
//!
//! Everything here is pure: the router feeds the live object in and gets the
//! value to write (or nothing) back, which keeps the conflict-retry loop free
//! of shared mutable state.

use crate::crd::canary::Canary;
use crate::crd::virtual_service::{
    Destination, DestinationWeight, HTTPRoute, PortSelector, VirtualService, VirtualServiceSpec,
};
use crate::router::retry::Write;
use crate::router::{RouteTarget, RouterError, BASELINE_WEIGHTS};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::Resource;
use std::collections::BTreeSet;

/// Declared hosts followed by the workload's own service name, deduplicated
/// with first occurrence winning
pub fn desired_hosts(canary: &Canary, target: &RouteTarget) -> Vec<String> {
    dedup(
        canary
            .spec
            .service
            .hosts
            .iter()
            .chain(std::iter::once(&target.name)),
    )
}

pub fn desired_gateways(canary: &Canary) -> Vec<String> {
    dedup(canary.spec.service.gateways.iter())
}

fn dedup<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && seen.insert(s.to_string()))
        .map(str::to_string)
        .collect()
}

fn destination(host: String, port: i32) -> Destination {
    Destination {
        host,
        subset: None,
        port: (port > 0).then_some(PortSelector { number: port }),
    }
}

/// The single HTTP rule: canary-declared options plus primary-then-canary
/// destinations carrying the given weights
pub fn build_route_rule(
    canary: &Canary,
    target: &RouteTarget,
    (primary_weight, canary_weight): (i32, i32),
) -> HTTPRoute {
    let service = &canary.spec.service;
    HTTPRoute {
        match_: service.match_.clone(),
        route: vec![
            DestinationWeight {
                destination: destination(target.primary_host(), service.port),
                weight: primary_weight,
            },
            DestinationWeight {
                destination: destination(target.canary_host(), service.port),
                weight: canary_weight,
            },
        ],
        rewrite: service.rewrite.clone(),
        timeout: service.timeout.clone(),
        retries: service.retries.clone(),
        append_headers: service.append_headers.clone(),
    }
}

pub fn build_spec(
    canary: &Canary,
    target: &RouteTarget,
    weights: (i32, i32),
) -> VirtualServiceSpec {
    VirtualServiceSpec {
        hosts: desired_hosts(canary, target),
        gateways: desired_gateways(canary),
        http: vec![build_route_rule(canary, target, weights)],
    }
}

/// A new VirtualService at baseline weights, controlled by the canary
pub fn build_virtual_service(canary: &Canary, target: &RouteTarget) -> VirtualService {
    VirtualService {
        metadata: ObjectMeta {
            name: Some(target.name.clone()),
            namespace: Some(target.namespace.clone()),
            owner_references: reconcile_owner_references(canary, None),
            ..Default::default()
        },
        spec: build_spec(canary, target, BASELINE_WEIGHTS),
    }
}

/// Owner references with the canary as controller
///
/// Existing references are returned untouched when the canary already
/// controls the object. Otherwise any other controller reference is replaced,
/// since Kubernetes allows only one. A canary without a uid (not yet
/// persisted) leaves the references as they are.
pub fn reconcile_owner_references(
    canary: &Canary,
    existing: Option<&Vec<OwnerReference>>,
) -> Option<Vec<OwnerReference>> {
    let Some(owner) = canary.controller_owner_ref(&()) else {
        return existing.cloned();
    };

    if let Some(refs) = existing {
        if refs
            .iter()
            .any(|r| r.uid == owner.uid && r.controller == Some(true))
        {
            return Some(refs.clone());
        }
    }

    let mut refs: Vec<OwnerReference> = existing
        .map(|refs| {
            refs.iter()
                .filter(|r| r.controller != Some(true) && r.uid != owner.uid)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    refs.push(owner);
    Some(refs)
}

/// Attribute the live weights to the canonical primary/canary destinations
///
/// Destinations are matched by host across every HTTP rule. A destination
/// that shows up more than once must carry the same weight each time,
/// otherwise the shape is ambiguous, as is a weight outside 0..=100. When
/// only one side can be attributed the other takes its complement; when
/// neither can, baseline applies.
pub fn attribute_weights(
    spec: &VirtualServiceSpec,
    target: &RouteTarget,
) -> Result<(i32, i32), RouterError> {
    let primary_host = target.primary_host();
    let canary_host = target.canary_host();

    let mut primary: Option<i32> = None;
    let mut canary: Option<i32> = None;

    for dw in spec.http.iter().flat_map(|rule| rule.route.iter()) {
        let (slot, host) = if dw.destination.host == primary_host {
            (&mut primary, &primary_host)
        } else if dw.destination.host == canary_host {
            (&mut canary, &canary_host)
        } else {
            continue;
        };

        if !(0..=100).contains(&dw.weight) {
            return Err(RouterError::Invalid {
                key: target.key(),
                reason: format!(
                    "destination {} has weight {} outside 0..=100",
                    host, dw.weight
                ),
            });
        }

        match *slot {
            Some(weight) if weight != dw.weight => {
                return Err(RouterError::Invalid {
                    key: target.key(),
                    reason: format!(
                        "destination {} appears with conflicting weights {} and {}",
                        host, weight, dw.weight
                    ),
                });
            }
            _ => *slot = Some(dw.weight),
        }
    }

    Ok(match (primary, canary) {
        (Some(p), Some(c)) => (p, c),
        (Some(p), None) => (p, 100 - p),
        (None, Some(c)) => (100 - c, c),
        (None, None) => BASELINE_WEIGHTS,
    })
}

/// Compare routing metadata of two specs
///
/// Hosts and gateways are compared as sets, rules exactly. Callers build the
/// desired spec with the live weights so that weights never cause a diff.
pub fn metadata_matches(desired: &VirtualServiceSpec, live: &VirtualServiceSpec) -> bool {
    fn as_set(items: &[String]) -> BTreeSet<&str> {
        items.iter().map(String::as_str).collect()
    }

    as_set(&desired.hosts) == as_set(&live.hosts)
        && as_set(&desired.gateways) == as_set(&live.gateways)
        && desired.http == live.http
}

/// Decide what `sync` writes for the given live state
pub fn plan_sync(
    canary: &Canary,
    target: &RouteTarget,
    live: Option<&VirtualService>,
) -> Result<Write, RouterError> {
    let Some(live) = live else {
        return Ok(Write::Create(build_virtual_service(canary, target)));
    };

    let weights = attribute_weights(&live.spec, target)?;
    let desired = build_spec(canary, target, weights);
    let owners =
        reconcile_owner_references(canary, live.metadata.owner_references.as_ref());

    if metadata_matches(&desired, &live.spec) && owners == live.metadata.owner_references {
        return Ok(Write::Unchanged);
    }

    let mut updated = live.clone();
    updated.spec = desired;
    updated.metadata.owner_references = owners;
    Ok(Write::Replace(updated))
}

#[cfg(test)]
#[path = "desired_test.rs"]
mod tests;

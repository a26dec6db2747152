//! Reading and writing the primary/canary weight split
//!
//! Destinations are found by the naming convention only. Each of
//! `<target>-primary` and `<target>-canary` must resolve to exactly one
//! destination; anything else means the route was never synced or has been
//! mangled, and the caller is told so instead of getting a guess.

use crate::crd::virtual_service::{DestinationWeight, VirtualService, VirtualServiceSpec};
use crate::router::{RouteTarget, RouterError};

/// (rule index, destination index) of a destination in `spec.http`
type Position = (usize, usize);

fn locate(spec: &VirtualServiceSpec, host: &str) -> Option<Position> {
    let mut found = spec.http.iter().enumerate().flat_map(|(i, rule)| {
        rule.route
            .iter()
            .enumerate()
            .filter(move |(_, dw)| dw.destination.host == host)
            .map(move |(j, _)| (i, j))
    });

    let first = found.next()?;
    match found.next() {
        None => Some(first),
        Some(_) => None,
    }
}

fn locate_pair(
    spec: &VirtualServiceSpec,
    target: &RouteTarget,
) -> Result<(Position, Position), RouterError> {
    let primary_host = target.primary_host();
    let canary_host = target.canary_host();

    let primary = locate(spec, &primary_host)
        .ok_or_else(|| target.not_found(format!("destination {}", primary_host)))?;
    let canary = locate(spec, &canary_host)
        .ok_or_else(|| target.not_found(format!("destination {}", canary_host)))?;

    Ok((primary, canary))
}

fn at(spec: &VirtualServiceSpec, (i, j): Position) -> &DestinationWeight {
    &spec.http[i].route[j]
}

/// Current (primary, canary) weights
pub fn read_weights(
    spec: &VirtualServiceSpec,
    target: &RouteTarget,
) -> Result<(i32, i32), RouterError> {
    let (primary, canary) = locate_pair(spec, target)?;
    Ok((at(spec, primary).weight, at(spec, canary).weight))
}

/// Copy of `vs` with the two weights replaced, or `None` when they already
/// hold those values
///
/// Nothing but the two weight fields is touched.
pub fn with_weights(
    vs: &VirtualService,
    target: &RouteTarget,
    primary_weight: i32,
    canary_weight: i32,
) -> Result<Option<VirtualService>, RouterError> {
    let (primary, canary) = locate_pair(&vs.spec, target)?;
    if at(&vs.spec, primary).weight == primary_weight
        && at(&vs.spec, canary).weight == canary_weight
    {
        return Ok(None);
    }

    let mut updated = vs.clone();
    updated.spec.http[primary.0].route[primary.1].weight = primary_weight;
    updated.spec.http[canary.0].route[canary.1].weight = canary_weight;
    Ok(Some(updated))
}

//! Istio VirtualService router
//!
//! Routes a canary through a VirtualService named after `targetRef.name`
//! holding one HTTP rule with two weighted destinations,
//! `<target>-primary` and `<target>-canary`.

pub mod desired;
pub mod weights;

use super::client::VirtualServiceClient;
use super::retry::{update_with_retry, CallLimits, Write};
use super::{MeshRouter, RouteTarget, RouterError};
use crate::crd::canary::Canary;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Router for the Istio service mesh
///
/// Holds no per-canary state; one instance serves every canary.
pub struct IstioRouter {
    client: Arc<dyn VirtualServiceClient>,
    limits: CallLimits,
}

impl IstioRouter {
    pub fn new(client: Arc<dyn VirtualServiceClient>, limits: CallLimits) -> Self {
        Self { client, limits }
    }

    async fn sync_inner(&self, canary: &Canary, target: &RouteTarget) -> Result<(), RouterError> {
        let written = update_with_retry(
            self.client.as_ref(),
            target,
            "sync",
            &self.limits.retry,
            |live| desired::plan_sync(canary, target, live),
        )
        .await?;

        match written {
            Some(vs) => {
                let (primary_weight, canary_weight) =
                    desired::attribute_weights(&vs.spec, target)?;
                info!(
                    virtualservice = %target.key(),
                    hosts = ?vs.spec.hosts,
                    gateways = ?vs.spec.gateways,
                    primary_weight = primary_weight,
                    canary_weight = canary_weight,
                    resource_version = ?vs.metadata.resource_version,
                    "VirtualService synced"
                );
            }
            None => {
                debug!(
                    virtualservice = %target.key(),
                    "VirtualService already in sync"
                );
            }
        }
        Ok(())
    }

    async fn set_routes_inner(
        &self,
        target: &RouteTarget,
        primary_weight: i32,
        canary_weight: i32,
    ) -> Result<(), RouterError> {
        let written = update_with_retry(
            self.client.as_ref(),
            target,
            "set_routes",
            &self.limits.retry,
            |live| {
                let live = live.ok_or_else(|| target.not_found("VirtualService"))?;
                Ok(
                    match weights::with_weights(live, target, primary_weight, canary_weight)? {
                        Some(updated) => Write::Replace(updated),
                        None => Write::Unchanged,
                    },
                )
            },
        )
        .await?;

        info!(
            virtualservice = %target.key(),
            primary_weight = primary_weight,
            canary_weight = canary_weight,
            changed = written.is_some(),
            "VirtualService weights set"
        );
        Ok(())
    }

    async fn get_routes_inner(&self, target: &RouteTarget) -> Result<(i32, i32), RouterError> {
        let vs = self
            .client
            .get(&target.namespace, &target.name)
            .await
            .map_err(|e| target.backend("get_routes", e))?
            .ok_or_else(|| target.not_found("VirtualService"))?;

        weights::read_weights(&vs.spec, target)
    }
}

#[async_trait]
impl MeshRouter for IstioRouter {
    fn name(&self) -> &'static str {
        "istio"
    }

    async fn sync(&self, canary: &Canary) -> Result<(), RouterError> {
        let target = RouteTarget::from_canary(canary)?;

        self.limits
            .bounded(&target, "sync", self.sync_inner(canary, &target))
            .await
            .inspect_err(|e| {
                error!(virtualservice = %target.key(), error = %e, "VirtualService sync failed");
            })
    }

    async fn set_routes(
        &self,
        canary: &Canary,
        primary_weight: i32,
        canary_weight: i32,
    ) -> Result<(), RouterError> {
        let target = RouteTarget::from_canary(canary)?;

        if i64::from(primary_weight) + i64::from(canary_weight) != 100 {
            debug!(
                virtualservice = %target.key(),
                primary_weight = primary_weight,
                canary_weight = canary_weight,
                "Weights do not add up to 100"
            );
        }

        self.limits
            .bounded(
                &target,
                "set_routes",
                self.set_routes_inner(&target, primary_weight, canary_weight),
            )
            .await
            .inspect_err(|e| {
                error!(virtualservice = %target.key(), error = %e, "Setting VirtualService weights failed");
            })
    }

    async fn get_routes(&self, canary: &Canary) -> Result<(i32, i32), RouterError> {
        let target = RouteTarget::from_canary(canary)?;

        self.limits
            .bounded(&target, "get_routes", self.get_routes_inner(&target))
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Tests can use unwrap/expect for brevity
#[path = "istio_test.rs"]
mod tests;

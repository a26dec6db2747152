//! Optimistic-concurrency writes and per-call limits
//!
//! Every write the router performs is a read-modify-write cycle: fetch the
//! current VirtualService, compute the next value with a pure function, and
//! submit it conditioned on the fetched resourceVersion. A conflict restarts
//! the cycle from the read; anything else is surfaced immediately.

use super::client::{ClientError, VirtualServiceClient};
use super::{RouteTarget, RouterError};
use crate::crd::virtual_service::VirtualService;
use crate::server::ShutdownSignal;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of read-modify-write attempts before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default backoff unit between conflicting attempts
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(50);

/// Default upper bound for a single router operation
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounded retry policy for conflicting writes
///
/// Attempt `n` (1-based) that hits a conflict sleeps `backoff * n` before the
/// next read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// What a transform wants written back
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Object is absent, create this value
    Create(VirtualService),
    /// Replace the fetched object with this value (keeps its resourceVersion)
    Replace(VirtualService),
    /// Live state already matches, nothing to write
    Unchanged,
}

/// Limits applied to every router call
#[derive(Clone)]
pub struct CallLimits {
    pub retry: RetryPolicy,
    pub timeout: Duration,
    /// Aborts in-flight calls (and their retry loops) when triggered
    pub cancel: Option<ShutdownSignal>,
}

impl Default for CallLimits {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            timeout: DEFAULT_OPERATION_TIMEOUT,
            cancel: None,
        }
    }
}

impl CallLimits {
    pub fn with_cancel(mut self, cancel: ShutdownSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run `fut` under the timeout and cancellation signal
    ///
    /// Cancellation wins over a ready result so that a cancelled caller never
    /// observes work started after the signal.
    pub async fn bounded<T, F>(
        &self,
        target: &RouteTarget,
        op: &'static str,
        fut: F,
    ) -> Result<T, RouterError>
    where
        F: Future<Output = Result<T, RouterError>>,
    {
        let cancelled = |target: &RouteTarget| RouterError::Cancelled {
            key: target.key(),
            op,
        };

        let mut cancel = self.cancel.clone();
        if cancel.as_ref().is_some_and(|c| c.is_shutdown()) {
            return Err(cancelled(target));
        }

        let wait_cancel = async {
            match cancel.as_mut() {
                Some(signal) => signal.wait().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = wait_cancel => Err(cancelled(target)),
            res = tokio::time::timeout(self.timeout, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(RouterError::Timeout {
                    key: target.key(),
                    op,
                    after: self.timeout,
                }),
            },
        }
    }
}

/// Read-modify-write a VirtualService with bounded conflict retries
///
/// `transform` receives the live object (or `None`) and decides what to
/// write. It is re-run against fresh state after every conflict, so it must
/// be a pure function of its input.
///
/// # Returns
/// * `Ok(Some(vs))` - the value that was written
/// * `Ok(None)` - the transform reported no change
/// * `Err(RouterError::Conflict)` - every attempt collided with another
///   writer or lost the object between read and write
pub async fn update_with_retry<F>(
    client: &dyn VirtualServiceClient,
    target: &RouteTarget,
    op: &'static str,
    policy: &RetryPolicy,
    transform: F,
) -> Result<Option<VirtualService>, RouterError>
where
    F: Fn(Option<&VirtualService>) -> Result<Write, RouterError>,
{
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        let current = client
            .get(&target.namespace, &target.name)
            .await
            .map_err(|e| target.backend(op, e))?;

        let result = match transform(current.as_ref())? {
            Write::Unchanged => return Ok(None),
            Write::Create(vs) => client.create(&target.namespace, &vs).await,
            Write::Replace(vs) => client.replace(&target.namespace, &vs).await,
        };

        match result {
            Ok(written) => {
                debug!(
                    virtualservice = %target.key(),
                    op = op,
                    attempt = attempt,
                    "VirtualService written"
                );
                return Ok(Some(written));
            }
            Err(e) if e.is_conflict() => {
                warn!(
                    virtualservice = %target.key(),
                    op = op,
                    attempt = attempt,
                    max_attempts = attempts,
                    error = %e,
                    "Write conflict, retrying from a fresh read"
                );
                if attempt < attempts {
                    tokio::time::sleep(policy.backoff * attempt).await;
                }
            }
            // Object vanished between read and write; the next read decides
            // whether to create it or report it missing
            Err(ClientError::NotFound) => {
                warn!(
                    virtualservice = %target.key(),
                    op = op,
                    attempt = attempt,
                    max_attempts = attempts,
                    "VirtualService deleted during update, retrying"
                );
                if attempt < attempts {
                    tokio::time::sleep(policy.backoff * attempt).await;
                }
            }
            Err(e) => return Err(target.backend(op, e)),
        }
    }

    Err(RouterError::Conflict {
        key: target.key(),
        attempts,
    })
}

#[cfg(test)]
#[path = "retry_test.rs"]
mod tests;

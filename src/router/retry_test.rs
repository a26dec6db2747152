#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::router::client::MockVirtualServiceClient;
use crate::server::shutdown_channel;

fn target() -> RouteTarget {
    RouteTarget {
        namespace: "default".to_string(),
        name: "podinfo".to_string(),
    }
}

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff: Duration::ZERO,
    }
}

fn seeded_client() -> MockVirtualServiceClient {
    let client = MockVirtualServiceClient::new();
    client.insert(
        "default",
        VirtualService::new("podinfo", Default::default()),
    );
    client
}

fn add_gateway(live: Option<&VirtualService>) -> Result<Write, RouterError> {
    let mut vs = live.cloned().expect("seeded");
    vs.spec.gateways.push("public-gateway".to_string());
    Ok(Write::Replace(vs))
}

#[test]
fn test_retry_policy_defaults() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_attempts, DEFAULT_MAX_ATTEMPTS);
    assert_eq!(policy.backoff, DEFAULT_BACKOFF);

    let limits = CallLimits::default();
    assert_eq!(limits.timeout, DEFAULT_OPERATION_TIMEOUT);
    assert!(limits.cancel.is_none());
}

#[tokio::test]
async fn test_update_with_retry_writes_once() {
    let client = seeded_client();

    let written = update_with_retry(&client, &target(), "test", &policy(3), add_gateway)
        .await
        .unwrap();

    assert!(written.is_some());
    assert_eq!(client.writes(), 1);
}

#[tokio::test]
async fn test_update_with_retry_unchanged_skips_write() {
    let client = seeded_client();

    let written = update_with_retry(&client, &target(), "test", &policy(3), |_| {
        Ok(Write::Unchanged)
    })
    .await
    .unwrap();

    assert!(written.is_none());
    assert_eq!(client.writes(), 0);
}

#[tokio::test]
async fn test_update_with_retry_rereads_after_conflict() {
    let client = seeded_client();
    client.inject_conflicts(2);

    update_with_retry(&client, &target(), "test", &policy(3), add_gateway)
        .await
        .unwrap();

    assert_eq!(client.writes(), 3);
    assert_eq!(client.gets(), 3);
    assert_eq!(
        client.stored("default", "podinfo").unwrap().spec.gateways,
        vec!["public-gateway"]
    );
}

#[tokio::test]
async fn test_update_with_retry_gives_up_after_max_attempts() {
    let client = seeded_client();
    client.inject_conflicts(3);

    let err = update_with_retry(&client, &target(), "test", &policy(3), add_gateway)
        .await
        .unwrap_err();

    assert!(matches!(err, RouterError::Conflict { attempts: 3, .. }));
    assert_eq!(client.writes(), 3);
}

#[tokio::test]
async fn test_update_with_retry_zero_attempts_still_tries_once() {
    let client = seeded_client();

    update_with_retry(&client, &target(), "test", &policy(0), add_gateway)
        .await
        .unwrap();

    assert_eq!(client.writes(), 1);
}

#[tokio::test]
async fn test_update_with_retry_transform_error_is_returned() {
    let client = MockVirtualServiceClient::new();

    let err = update_with_retry(&client, &target(), "test", &policy(3), |live| match live {
        Some(_) => Ok(Write::Unchanged),
        None => Err(target().not_found("VirtualService")),
    })
    .await
    .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(client.gets(), 1);
}

#[tokio::test]
async fn test_bounded_passes_result_through() {
    let limits = CallLimits::default();

    let value = limits
        .bounded(&target(), "test", async { Ok::<_, RouterError>(42) })
        .await
        .unwrap();

    assert_eq!(value, 42);
}

#[tokio::test]
async fn test_bounded_cancel_wins_over_ready_result() {
    let (controller, signal) = shutdown_channel();
    let limits = CallLimits::default().with_cancel(signal);
    controller.shutdown();

    let err = limits
        .bounded(&target(), "test", async { Ok::<_, RouterError>(42) })
        .await
        .unwrap_err();

    assert!(matches!(err, RouterError::Cancelled { op: "test", .. }));
}

#[tokio::test]
async fn test_bounded_times_out() {
    let limits = CallLimits {
        timeout: Duration::from_millis(10),
        ..Default::default()
    };

    let err = limits
        .bounded(&target(), "test", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, RouterError>(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, RouterError::Timeout { .. }));
    assert!(err.to_string().contains("default/podinfo"));
}

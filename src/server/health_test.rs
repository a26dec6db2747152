use super::*;
use std::time::Duration;

/// Poll /healthz until the freshly spawned server accepts connections
async fn wait_for_server(port: u16, max_retries: u32) -> reqwest::Client {
    let client = reqwest::Client::new();
    let mut delay = Duration::from_millis(10);

    for attempt in 1..=max_retries {
        match client
            .get(format!("http://127.0.0.1:{}/healthz", port))
            .timeout(Duration::from_millis(100))
            .send()
            .await
        {
            Ok(_) => return client,
            Err(_) if attempt < max_retries => {
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_millis(200));
            }
            Err(e) => panic!("Server not ready after {} attempts: {}", max_retries, e),
        }
    }
    client
}

async fn get_status(client: &reqwest::Client, port: u16, path: &str) -> u16 {
    client
        .get(format!("http://127.0.0.1:{}{}", port, path))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to connect to health server")
        .status()
        .as_u16()
}

fn spawn_server(
    port: u16,
    readiness: &ReadinessState,
    metrics: &SharedMetrics,
) -> tokio::task::JoinHandle<Result<(), std::io::Error>> {
    let readiness = readiness.clone();
    let metrics = metrics.clone();
    tokio::spawn(async move { run_health_server(port, readiness, metrics).await })
}

#[tokio::test]
async fn test_healthz_returns_200() {
    let readiness = ReadinessState::new();
    let metrics = create_metrics().unwrap();
    let port = 18080;

    let handle = spawn_server(port, &readiness, &metrics);
    let client = wait_for_server(port, 10).await;

    assert_eq!(get_status(&client, port, "/healthz").await, 200);

    handle.abort();
}

#[tokio::test]
async fn test_readyz_follows_readiness_state() {
    let readiness = ReadinessState::new();
    let metrics = create_metrics().unwrap();
    let port = 18081;

    let handle = spawn_server(port, &readiness, &metrics);
    let client = wait_for_server(port, 10).await;

    assert_eq!(get_status(&client, port, "/readyz").await, 503);

    readiness.set_ready();
    assert_eq!(get_status(&client, port, "/readyz").await, 200);

    readiness.set_not_ready();
    assert_eq!(get_status(&client, port, "/readyz").await, 503);

    handle.abort();
}

#[tokio::test]
async fn test_metrics_endpoint_serves_controller_metrics() {
    let readiness = ReadinessState::new();
    let metrics = create_metrics().unwrap();
    metrics.record_reconciliation_success(0.01);
    let port = 18082;

    let handle = spawn_server(port, &readiness, &metrics);
    let client = wait_for_server(port, 10).await;

    let response = client
        .get(format!("http://127.0.0.1:{}/metrics", port))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to connect to health server");

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("meshsplit_reconciliations_total"));

    handle.abort();
}

#[test]
fn test_readiness_state_clones_share_flag() {
    let state = ReadinessState::new();
    assert!(!state.is_ready());

    let cloned = state.clone();
    state.set_ready();
    assert!(cloned.is_ready());
}

#[tokio::test]
async fn test_run_health_server_reports_bind_failure() {
    let metrics = create_metrics().unwrap();
    let port = 18083;
    let _occupied = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .expect("Failed to reserve test port");

    let err = run_health_server(port, ReadinessState::new(), metrics)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), std::io::ErrorKind::AddrInUse);
}

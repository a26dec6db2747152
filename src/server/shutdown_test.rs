use super::shutdown::*;
use std::time::Duration;

#[tokio::test]
async fn test_shutdown_channel_starts_running() {
    let (_controller, signal) = shutdown_channel();
    assert!(!signal.is_shutdown());
}

#[tokio::test]
async fn test_shutdown_reaches_every_clone() {
    let (controller, signal) = shutdown_channel();
    let clones = [signal.clone(), signal.clone()];

    controller.shutdown();

    assert!(signal.is_shutdown());
    assert!(clones.iter().all(ShutdownSignal::is_shutdown));
}

#[tokio::test]
async fn test_wait_completes_on_shutdown() {
    let (controller, mut signal) = shutdown_channel();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.shutdown();
    });

    let result = tokio::time::timeout(Duration::from_secs(1), signal.wait()).await;

    assert!(result.is_ok(), "wait() should complete when shutdown triggered");
    assert!(signal.is_shutdown());
}

#[tokio::test]
async fn test_wait_returns_immediately_after_shutdown() {
    let (controller, mut signal) = shutdown_channel();
    controller.shutdown();

    let result = tokio::time::timeout(Duration::from_millis(100), signal.wait()).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_wait_completes_when_controller_dropped() {
    let (controller, mut signal) = shutdown_channel();
    drop(controller);

    let result = tokio::time::timeout(Duration::from_millis(100), signal.wait()).await;

    assert!(result.is_ok());
    assert!(!signal.is_shutdown());
}

#[tokio::test]
async fn test_wait_blocks_while_running() {
    let (_controller, mut signal) = shutdown_channel();

    let result = tokio::time::timeout(Duration::from_millis(50), signal.wait()).await;
    assert!(result.is_err(), "wait() must not resolve before shutdown");
}

use futures::StreamExt;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use meshsplit::config::ControllerConfig;
use meshsplit::controller::{error_policy, reconcile, Context};
use meshsplit::crd::canary::Canary;
use meshsplit::crd::virtual_service::VirtualService;
use meshsplit::router::select_router;
use meshsplit::server::{
    create_metrics, run_health_server, shutdown_channel, wait_for_signal, ReadinessState,
};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting meshsplit canary router");

    let config = ControllerConfig::from_env()?;
    info!(
        mesh_provider = %config.mesh_provider,
        health_port = config.health_port,
        conflict_retries = config.retry.max_attempts,
        operation_timeout = ?config.operation_timeout,
        watch_namespace = ?config.watch_namespace,
        "Configuration loaded"
    );

    let (shutdown_controller, shutdown_signal) = shutdown_channel();
    let readiness = ReadinessState::new();
    let metrics = create_metrics()?;

    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!("Connected to Kubernetes cluster");

    let health_readiness = readiness.clone();
    let health_metrics = metrics.clone();
    let health_port = config.health_port;
    let health_handle = tokio::spawn(async move {
        if let Err(e) = run_health_server(health_port, health_readiness, health_metrics).await {
            warn!(error = %e, "Health server failed");
        }
    });

    let router = select_router(
        config.mesh_provider,
        client.clone(),
        config.call_limits().with_cancel(shutdown_signal),
    );
    info!(router = router.name(), "Mesh router selected");

    let (canaries, virtual_services) = match &config.watch_namespace {
        Some(ns) => (
            Api::<Canary>::namespaced(client.clone(), ns),
            Api::<VirtualService>::namespaced(client.clone(), ns),
        ),
        None => (
            Api::<Canary>::all(client.clone()),
            Api::<VirtualService>::all(client.clone()),
        ),
    };

    let ctx = Arc::new(Context::new(router, Some(metrics.clone())));

    readiness.set_ready();
    info!("Controller ready, starting reconciliation loop");

    // error_policy logs failures, only successes are logged here
    let controller = Controller::new(canaries, watcher::Config::default())
        .owns(virtual_services, watcher::Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            if let Ok((obj, _)) = res {
                info!(canary = %obj.name, namespace = ?obj.namespace, "Reconciled");
            }
        });

    tokio::select! {
        _ = controller => {
            info!("Controller stream ended");
        }
        signal = wait_for_signal() => {
            match signal {
                Ok(name) => info!(signal = name, "Initiating graceful shutdown"),
                Err(e) => error!(error = %e, "Signal handling failed, shutting down"),
            }
            readiness.set_not_ready();
        }
    }

    // Cancels router calls still in flight
    shutdown_controller.shutdown();
    health_handle.abort();

    info!("meshsplit shut down gracefully");
    Ok(())
}

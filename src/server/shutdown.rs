//! Graceful shutdown
//!
//! A single `watch` channel fans the shutdown decision out to every
//! listener: the controller loop stops picking up Canaries and router calls
//! still in flight return `RouterError::Cancelled` instead of writing.

use tokio::sync::watch;
use tracing::info;

/// Listener half of the shutdown channel; clone it per component
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown is triggered, or the controller is dropped
    pub async fn wait(&mut self) {
        // wait_for returns Err only when the sender is gone
        let _ = self.receiver.wait_for(|stopped| *stopped).await;
    }

    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Trigger half of the shutdown channel
#[derive(Debug)]
pub struct ShutdownController {
    sender: watch::Sender<bool>,
}

impl ShutdownController {
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
        info!("Shutdown signal sent");
    }
}

/// Create a linked (controller, signal) pair
pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownController { sender }, ShutdownSignal { receiver })
}

/// Wait for SIGTERM or SIGINT and return the name of the signal received
///
/// Fails only when a handler cannot be registered.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    info!(signal = name, "Received termination signal");
    Ok(name)
}

#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    info!(signal = "CTRL_C", "Received termination signal");
    Ok("CTRL_C")
}

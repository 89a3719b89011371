use anyhow::Result;
use tokio::sync::watch;
use tracing::{info, warn};

/// Cooperative stop signal for the coordination loop and edge nodes.
///
/// Loops poll it at tick boundaries only; nothing is cancelled mid-tick.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    sender: watch::Sender<bool>,
}

/// Receiving side of a [`ShutdownCoordinator`]
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Request a stop. Idempotent.
    pub fn trigger(&self) {
        if !*self.sender.borrow() {
            info!("Shutdown requested");
        }
        self.sender.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    /// Install a Ctrl-C handler that triggers shutdown
    pub fn install_signal_handlers(&self) -> Result<()> {
        info!("Installing signal handlers for graceful shutdown");
        let sender = self.sender.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl-C, stopping at next tick boundary");
                    sender.send_replace(true);
                }
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
        });
        Ok(())
    }
}

impl ShutdownSignal {
    /// A signal that never fires, for runs bounded some other way
    pub fn never() -> Self {
        let (_, receiver) = watch::channel(false);
        Self { receiver }
    }

    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once shutdown is requested
    pub async fn wait(&mut self) {
        if self.receiver.wait_for(|stop| *stop).await.is_err() {
            // sender dropped without triggering: never resolve
            std::future::pending::<()>().await;
        }
    }
}

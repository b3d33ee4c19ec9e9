use anyhow::Result;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

/// Graceful shutdown coordinator for the station's tasks
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
    grace: Duration,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl ShutdownCoordinator {
    pub fn new(grace: Duration) -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx, grace }
    }

    /// Receiver that turns true when shutdown begins
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    /// Signal every subscriber to stop
    pub fn trigger(&self) {
        info!("Initiating graceful shutdown");
        self.tx.send_replace(true);
    }

    /// Sender for tasks that may end the run themselves
    pub fn trigger_handle(&self) -> watch::Sender<bool> {
        self.tx.clone()
    }

    /// Trigger shutdown on Ctrl-C
    pub fn install_signal_handlers(&self) -> JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received interrupt signal, shutting down");
                    tx.send_replace(true);
                }
                Err(e) => warn!("Failed to listen for interrupt signal: {}", e),
            }
        })
    }

    /// Wait up to the grace period for `task` to finish
    pub async fn wait_for(&self, name: &str, task: JoinHandle<()>) -> Result<()> {
        match timeout(self.grace, task).await {
            Ok(Ok(())) => {
                info!(task = name, "Task finished cleanly");
                Ok(())
            }
            Ok(Err(e)) => Err(anyhow::anyhow!("{name} task failed: {e}")),
            Err(_) => Err(anyhow::anyhow!(
                "Timeout waiting for {name} to finish after {:?}",
                self.grace
            )),
        }
    }
}

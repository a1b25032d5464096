//! Signal handling and ordered teardown

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

use super::process::Service;

/// Broadcasts a shutdown request and tears services down exactly once
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
    stopped: AtomicBool,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    /// A coordinator that is only triggered programmatically
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx,
            stopped: AtomicBool::new(false),
        }
    }

    /// Create a coordinator triggered by SIGINT, SIGTERM, SIGHUP and SIGQUIT.
    ///
    /// Must be called from inside a tokio runtime, once per process.
    pub fn install() -> Result<Self, ShutdownError> {
        let coordinator = Self::new();

        {
            let tx = coordinator.tx.clone();
            ctrlc::set_handler(move || {
                log::info!("Received termination signal, initiating shutdown...");
                let _ = tx.send(true);
            })?;
        }

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut quit = signal(SignalKind::quit()).map_err(ShutdownError::Signal)?;
            let tx = coordinator.tx.clone();
            tokio::spawn(async move {
                if quit.recv().await.is_some() {
                    log::info!("Received SIGQUIT, initiating shutdown...");
                    let _ = tx.send(true);
                }
            });
        }

        Ok(coordinator)
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Request shutdown from code, e.g. after a run error
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Stop `services`, given in start order, from last to first.
    ///
    /// Only the first call does anything; returns the names of the
    /// services it stopped, in stop order.
    pub fn stop_all<'a, I>(&self, services: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a mut Service>,
        I::IntoIter: DoubleEndedIterator,
    {
        if self.stopped.swap(true, Ordering::SeqCst) {
            log::debug!("Services already stopped");
            return Vec::new();
        }

        log::info!("Shutting down all services...");
        let mut stopped = Vec::new();
        for service in services.into_iter().rev() {
            service.stop();
            stopped.push(service.name().to_string());
        }
        log::info!("All {} services shut down", stopped.len());
        stopped
    }
}

/// Resolve once `rx` carries `true`; never resolves if the sender is gone
pub async fn requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("Failed to install signal handler: {0}")]
    Handler(#[from] ctrlc::Error),

    #[error("Failed to listen for SIGQUIT: {0}")]
    Signal(#[source] std::io::Error),
}

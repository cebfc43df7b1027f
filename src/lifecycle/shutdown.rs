//! Signal handling for graceful shutdown

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::debug;

/// Handles shutdown signals (SIGTERM, SIGINT)
pub struct ShutdownSignal {
    sigterm: Signal,
    sigint: Signal,
}

impl ShutdownSignal {
    /// Register the shutdown signal handlers
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    /// Wait for a shutdown signal
    pub async fn wait(&mut self) {
        tokio::select! {
            _ = self.sigterm.recv() => {
                debug!("received SIGTERM");
            }
            _ = self.sigint.recv() => {
                debug!("received SIGINT");
            }
        }
    }
}

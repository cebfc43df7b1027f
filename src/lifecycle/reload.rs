//! SIGHUP handling for settings reload

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::debug;

/// Yields once per SIGHUP
pub struct ReloadSignal {
    sighup: Signal,
}

impl ReloadSignal {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            sighup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the next reload request; `None` once the stream is closed
    pub async fn next(&mut self) -> Option<()> {
        let received = self.sighup.recv().await;
        debug!("received SIGHUP");
        received
    }
}

//! Background sweep service driving the relay's batch-claim loop.
//!
//! The sweep is the reliability backstop: it drains rows the fast path
//! missed because of a crash between commit and publish, a transient
//! publish error, or a lost claim race. One sweep runs at a time per
//! process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info};

use super::relay::Relay;

pub struct OutboxSweeper {
    relay: Arc<Relay>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl OutboxSweeper {
    pub fn new(relay: Arc<Relay>, interval: Duration) -> Self {
        Self {
            relay,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for signalling shutdown from outside the run loop.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Sweep on a fixed delay until shutdown is requested.
    pub async fn run(self) -> Result<()> {
        info!(interval_ms = self.interval.as_millis() as u64, "outbox sweeper starting");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            match self.relay.sweep().await {
                Ok(0) => {}
                Ok(claimed) => debug!(claimed, "sweep drained outbox rows"),
                Err(e) => error!(error = %e, "outbox sweep failed"),
            }

            tokio::time::sleep(self.interval).await;
        }

        info!("outbox sweeper stopped");
        Ok(())
    }
}

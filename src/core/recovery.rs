//! Lease recovery: expired RUNNING commands become TIMED_OUT.
//!
//! A worker that crashes mid-execution leaves its command RUNNING with a
//! lease. Once the lease expires no worker can still be executing it, so
//! the reaper records the timeout; operators decide whether to replay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::store::CommandStore;

const TIMEOUT_REASON: &str = "processing lease expired";

pub struct LeaseReaper {
    pool: PgPool,
    commands: CommandStore,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl LeaseReaper {
    pub fn new(pool: PgPool, commands: CommandStore, interval: Duration) -> Self {
        Self {
            pool,
            commands,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Reap on a fixed delay until shutdown is requested.
    pub async fn run(self) -> Result<()> {
        info!(interval_ms = self.interval.as_millis() as u64, "lease reaper starting");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            match self
                .commands
                .time_out_expired_leases(&self.pool, TIMEOUT_REASON)
                .await
            {
                Ok(ids) if ids.is_empty() => {}
                Ok(ids) => {
                    for command_id in &ids {
                        warn!(command_id = %command_id, "command lease expired, marked TIMED_OUT");
                    }
                }
                Err(e) => error!(error = %e, "lease reap failed"),
            }

            tokio::time::sleep(self.interval).await;
        }

        info!("lease reaper stopped");
        Ok(())
    }
}

//! Outbox relay: pulls claimed rows and writes them to the right transport.
//!
//! Rows are claimed in one short statement, then published with no
//! transaction held open across the network call. A failed publish never
//! escapes `send_and_mark` — the row is rescheduled with exponential
//! backoff and the sweep retries it.

use std::cmp;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::kernel::{CommandQueue, EventPublisher};
use crate::store::{OutboxCategory, OutboxRow, OutboxStore};

pub struct Relay {
    pool: PgPool,
    outbox: OutboxStore,
    queue: Arc<dyn CommandQueue>,
    events: Arc<dyn EventPublisher>,
    max_backoff: Duration,
    batch_size: i64,
    claimer: String,
}

impl Relay {
    pub fn new(
        pool: PgPool,
        outbox: OutboxStore,
        queue: Arc<dyn CommandQueue>,
        events: Arc<dyn EventPublisher>,
        max_backoff: Duration,
        batch_size: i64,
        claimer: String,
    ) -> Self {
        Self {
            pool,
            outbox,
            queue,
            events,
            max_backoff,
            batch_size,
            claimer,
        }
    }

    /// Best-effort single-row publish, used by the post-commit fast path.
    /// Losing the claim race (row already claimed or published) is a no-op.
    pub async fn publish_now(&self, id: Uuid) -> Result<()> {
        if let Some(row) = self.outbox.claim_one(&self.pool, id, &self.claimer).await? {
            self.send_and_mark(&row).await?;
        }
        Ok(())
    }

    /// Claim and publish a batch of eligible rows. Returns how many rows
    /// were claimed.
    pub async fn sweep(&self) -> Result<usize> {
        let rows = self
            .outbox
            .claim(&self.pool, self.batch_size, &self.claimer)
            .await?;
        let claimed = rows.len();
        for row in &rows {
            self.send_and_mark(row).await?;
        }
        Ok(claimed)
    }

    /// Dispatch one row and record the outcome. Publish errors are handled
    /// here (reschedule with backoff); only store errors propagate.
    async fn send_and_mark(&self, row: &OutboxRow) -> Result<()> {
        match self.dispatch(row).await {
            Ok(()) => {
                debug!(outbox_id = %row.id, topic = %row.topic, "outbox row published");
                self.outbox.mark_published(&self.pool, row.id).await?;
            }
            Err(error) => {
                let backoff = backoff_millis(row.attempts, self.max_backoff);
                warn!(
                    outbox_id = %row.id,
                    topic = %row.topic,
                    attempts = row.attempts,
                    backoff_ms = backoff,
                    error = %error,
                    "publish failed, rescheduling"
                );
                self.outbox
                    .reschedule(&self.pool, row.id, backoff, &error.to_string())
                    .await?;
            }
        }
        Ok(())
    }

    async fn dispatch(&self, row: &OutboxRow) -> Result<()> {
        match row.category {
            OutboxCategory::Command | OutboxCategory::Reply => {
                self.queue
                    .send(&row.topic, &row.payload, &row.headers)
                    .await
            }
            OutboxCategory::Event => {
                self.events
                    .publish(&row.topic, &row.key, &row.payload, &row.headers)
                    .await
            }
        }
    }
}

/// Backoff law: `min(max_backoff, 2^max(1, attempts + 1) seconds)`.
/// Attempt 0 waits 2s, attempt 5 waits 64s, capped at `max_backoff`.
pub fn backoff_millis(attempts: i32, max_backoff: Duration) -> u64 {
    let exponent = cmp::max(1, attempts.saturating_add(1)) as u32;
    let delay = 2u64.saturating_pow(exponent).saturating_mul(1000);
    cmp::min(max_backoff.as_millis() as u64, delay)
}

//! Post-commit fast path: publish a specific outbox row the moment its
//! transaction commits, instead of waiting for the next sweep.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::store::UnitOfWork;

use super::relay::Relay;

/// Arms a unit of work with an after-commit publish of one outbox row.
///
/// The publish runs out-of-band after the transaction has ended and its
/// failure is swallowed: the row is already durable, so the sweep is the
/// backstop and the committed work must never be failed retroactively.
#[derive(Clone)]
pub struct FastPathPublisher {
    relay: Arc<Relay>,
}

impl FastPathPublisher {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }

    /// Register `outbox_id` for publication after `uow` commits. If the
    /// unit of work rolls back, nothing fires.
    pub fn register(&self, uow: &mut UnitOfWork, outbox_id: Uuid) {
        let relay = self.relay.clone();
        uow.after_commit(move || {
            tokio::spawn(async move {
                if let Err(error) = relay.publish_now(outbox_id).await {
                    warn!(
                        outbox_id = %outbox_id,
                        error = %error,
                        "fast-path publish failed, sweep will retry"
                    );
                }
            });
        });
    }
}

//! Idempotent command execution: the consume side of the engine.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::config::Naming;
use crate::store::{
    CommandStore, DlqStore, InboxStore, OutboxStore, ParkedCommand, UnitOfWork,
};

use super::aggregates;
use super::envelope::Envelope;
use super::fast_path::FastPathPublisher;
use super::handler::HandlerRegistry;
use super::rows::OutboxRows;

/// Inbox handler name recorded per processed message.
pub const HANDLER_NAME: &str = "CommandExecutor";

/// What processing a delivery amounted to. `Err` from [`Executor::process`]
/// means nothing was committed and the message layer should redeliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Handler succeeded; success reply and event are staged.
    Completed,
    /// Handler failed permanently; the command is FAILED and parked, and
    /// the failure reply and event are staged. Committed, not an error.
    FailedPermanently,
    /// The inbox had already seen this message id; nothing was done.
    Duplicate,
}

pub struct Executor {
    pool: PgPool,
    inbox: InboxStore,
    commands: CommandStore,
    outbox: OutboxStore,
    dlq: DlqStore,
    rows: OutboxRows,
    registry: Arc<HandlerRegistry>,
    fast_path: FastPathPublisher,
    naming: Naming,
    lease: ChronoDuration,
    worker_id: String,
}

impl Executor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        inbox: InboxStore,
        commands: CommandStore,
        outbox: OutboxStore,
        dlq: DlqStore,
        rows: OutboxRows,
        registry: Arc<HandlerRegistry>,
        fast_path: FastPathPublisher,
        naming: Naming,
        lease: std::time::Duration,
        worker_id: String,
    ) -> Self {
        Self {
            pool,
            inbox,
            commands,
            outbox,
            dlq,
            rows,
            registry,
            fast_path,
            naming,
            lease: ChronoDuration::from_std(lease).unwrap_or_else(|_| ChronoDuration::seconds(300)),
            worker_id,
        }
    }

    /// Process one delivery. Inbox dedup, the status transition, and the
    /// reply/event outbox rows share a single transaction; the fast path
    /// fires only once that transaction commits.
    ///
    /// A retryable handler failure rolls the transaction back (the inbox
    /// row vanishes with it, so redelivery runs the handler again), bumps
    /// the retry counter out-of-band so it survives the rollback, and
    /// propagates the failure to the message layer.
    pub async fn process(&self, env: &Envelope) -> Result<Outcome> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;

        if !self
            .inbox
            .mark_if_absent(uow.conn(), &env.message_id.to_string(), HANDLER_NAME)
            .await?
        {
            debug!(message_id = %env.message_id, "duplicate delivery ignored");
            uow.rollback().await?;
            return Ok(Outcome::Duplicate);
        }

        let lease_until = Utc::now() + self.lease;
        self.commands
            .mark_running(uow.conn(), env.command_id, lease_until)
            .await?;

        match self.registry.invoke(&env.name, &env.payload).await {
            Ok(result_json) => {
                self.commands
                    .mark_succeeded(uow.conn(), env.command_id)
                    .await?;

                let reply = self.rows.reply(env, "CommandCompleted", result_json);
                let reply_id = self.outbox.add_returning_id(uow.conn(), &reply).await?;

                let event = self.rows.event(
                    self.naming.event_topic(&env.name),
                    &env.key,
                    "CommandCompleted",
                    aggregates::snapshot(&env.key),
                );
                let event_id = self.outbox.add_returning_id(uow.conn(), &event).await?;

                self.fast_path.register(&mut uow, reply_id);
                self.fast_path.register(&mut uow, event_id);
                uow.commit().await?;

                info!(command_id = %env.command_id, name = %env.name, "command succeeded");
                Ok(Outcome::Completed)
            }
            Err(failure) if !failure.is_retryable() => {
                let message = failure.message();
                self.commands
                    .mark_failed(uow.conn(), env.command_id, message)
                    .await?;
                self.dlq
                    .park(
                        uow.conn(),
                        &ParkedCommand {
                            command_id: env.command_id,
                            command_name: &env.name,
                            business_key: &env.key,
                            payload: &env.payload,
                            failed_status: "FAILED",
                            error_class: failure.class(),
                            error_message: message,
                            attempts: 0,
                            parked_by: &self.worker_id,
                        },
                    )
                    .await?;

                let error_json = serde_json::json!({ "error": message }).to_string();
                let reply = self.rows.reply(env, "CommandFailed", error_json.clone());
                let reply_id = self.outbox.add_returning_id(uow.conn(), &reply).await?;

                let event = self.rows.event(
                    self.naming.event_topic(&env.name),
                    &env.key,
                    "CommandFailed",
                    error_json,
                );
                let event_id = self.outbox.add_returning_id(uow.conn(), &event).await?;

                self.fast_path.register(&mut uow, reply_id);
                self.fast_path.register(&mut uow, event_id);

                // Commit, do not rethrow: the FAILED state and the DLQ entry
                // are the recorded outcome, and a rollback would lose both.
                uow.commit().await?;

                warn!(
                    command_id = %env.command_id,
                    name = %env.name,
                    error = %message,
                    "command failed permanently, parked in dlq"
                );
                Ok(Outcome::FailedPermanently)
            }
            Err(failure) => {
                uow.rollback().await?;
                self.commands
                    .bump_retry(&self.pool, env.command_id, failure.message())
                    .await?;

                warn!(
                    command_id = %env.command_id,
                    name = %env.name,
                    class = failure.class(),
                    error = %failure.message(),
                    "command failed, awaiting redelivery"
                );
                Err(anyhow::Error::new(failure).context("retryable command failure"))
            }
        }
    }
}

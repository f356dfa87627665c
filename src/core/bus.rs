//! Command ingest: accept a business request, persist it with its outbound
//! dispatch in one transaction, and arm the fast path.

use std::collections::HashMap;

use anyhow::Context;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::store::{CommandStore, OutboxStore, SaveCommandError, UnitOfWork};

use super::fast_path::FastPathPublisher;
use super::rows::OutboxRows;

/// Ingest failure classes, mapped to 4xx by the HTTP layer.
#[derive(Debug, Error)]
pub enum AcceptError {
    #[error("duplicate idempotency key")]
    DuplicateIdempotency,
    #[error("a command with this name and business key already exists")]
    DuplicateBusiness,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AcceptError {
    fn from(e: sqlx::Error) -> Self {
        AcceptError::Internal(e.into())
    }
}

impl From<SaveCommandError> for AcceptError {
    fn from(e: SaveCommandError) -> Self {
        match e {
            SaveCommandError::DuplicateIdempotency => AcceptError::DuplicateIdempotency,
            SaveCommandError::DuplicateBusiness => AcceptError::DuplicateBusiness,
            SaveCommandError::Db(e) => AcceptError::Internal(e.into()),
        }
    }
}

pub struct CommandBus {
    pool: PgPool,
    commands: CommandStore,
    outbox: OutboxStore,
    rows: OutboxRows,
    fast_path: FastPathPublisher,
}

impl CommandBus {
    pub fn new(
        pool: PgPool,
        commands: CommandStore,
        outbox: OutboxStore,
        rows: OutboxRows,
        fast_path: FastPathPublisher,
    ) -> Self {
        Self {
            pool,
            commands,
            outbox,
            rows,
            fast_path,
        }
    }

    /// Accept a command. The pre-check, the PENDING insert, and the
    /// outbound outbox row commit atomically; the fast path fires only
    /// after that commit. The unique constraints back the pre-check, so a
    /// concurrent duplicate still loses cleanly.
    pub async fn accept(
        &self,
        name: &str,
        idempotency_key: &str,
        business_key: &str,
        payload: &str,
        reply_meta: &HashMap<String, String>,
    ) -> Result<Uuid, AcceptError> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;

        if self
            .commands
            .exists_by_idempotency_key(uow.conn(), idempotency_key)
            .await?
        {
            return Err(AcceptError::DuplicateIdempotency);
        }

        let reply_json =
            serde_json::to_string(reply_meta).context("reply metadata is not serializable")?;
        let command_id = self
            .commands
            .save_pending(
                uow.conn(),
                name,
                idempotency_key,
                business_key,
                payload,
                &reply_json,
            )
            .await?;

        let row = self
            .rows
            .command_requested(name, command_id, business_key, payload, reply_meta);
        let outbox_id = self.outbox.add_returning_id(uow.conn(), &row).await?;
        self.fast_path.register(&mut uow, outbox_id);

        uow.commit().await?;

        info!(command_id = %command_id, name = %name, "command accepted");
        Ok(command_id)
    }
}

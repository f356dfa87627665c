//! Command persistence: one row per accepted business request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgExecutor;
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

/// Command lifecycle states. `SUCCEEDED`, `FAILED` and `TIMED_OUT` are
/// terminal and only administrative replay may leave them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "command_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

/// A persisted command. Payload and reply metadata stay opaque JSON text.
#[derive(FromRow, Debug, Clone, Serialize)]
pub struct CommandRecord {
    pub id: Uuid,
    pub name: String,
    pub business_key: String,
    pub payload: String,
    pub idempotency_key: String,
    pub status: CommandStatus,
    pub retries: i32,
    pub processing_lease_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub reply: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Failure classes for [`CommandStore::save_pending`]. The duplicate
/// variants map the two unique constraints so ingest can answer 4xx.
#[derive(Debug, Error)]
pub enum SaveCommandError {
    #[error("duplicate idempotency key")]
    DuplicateIdempotency,
    #[error("duplicate command for business key")]
    DuplicateBusiness,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

const SELECT_COLUMNS: &str = "id, name, business_key, payload::text AS payload, idempotency_key, \
     status, retries, processing_lease_until, last_error, reply::text AS reply, \
     requested_at, updated_at";

/// Row operations for the `command` table. Every method runs on whatever
/// executor it is handed, so callers decide whether it joins an ambient
/// transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandStore;

impl CommandStore {
    pub fn new() -> Self {
        Self
    }

    /// Insert a new PENDING command and return its id.
    pub async fn save_pending<'e>(
        &self,
        db: impl PgExecutor<'e>,
        name: &str,
        idempotency_key: &str,
        business_key: &str,
        payload: &str,
        reply_json: &str,
    ) -> Result<Uuid, SaveCommandError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO command (id, name, business_key, payload, idempotency_key, status, reply)
            VALUES ($1, $2, $3, $4::jsonb, $5, 'PENDING', $6::jsonb)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(business_key)
        .bind(payload)
        .bind(idempotency_key)
        .bind(reply_json)
        .execute(db)
        .await
        .map_err(classify_unique_violation)?;

        Ok(id)
    }

    /// Point read.
    pub async fn find<'e>(
        &self,
        db: impl PgExecutor<'e>,
        id: Uuid,
    ) -> Result<Option<CommandRecord>, sqlx::Error> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM command WHERE id = $1");
        sqlx::query_as::<_, CommandRecord>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn mark_running<'e>(
        &self,
        db: impl PgExecutor<'e>,
        id: Uuid,
        lease_until: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE command
            SET status = 'RUNNING', processing_lease_until = $1, updated_at = now()
            WHERE id = $2
            "#,
        )
        .bind(lease_until)
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn mark_succeeded<'e>(
        &self,
        db: impl PgExecutor<'e>,
        id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE command SET status = 'SUCCEEDED', updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn mark_failed<'e>(
        &self,
        db: impl PgExecutor<'e>,
        id: Uuid,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE command SET status = 'FAILED', last_error = $1, updated_at = now() WHERE id = $2",
        )
        .bind(error)
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn mark_timed_out<'e>(
        &self,
        db: impl PgExecutor<'e>,
        id: Uuid,
        reason: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE command SET status = 'TIMED_OUT', last_error = $1, updated_at = now() WHERE id = $2",
        )
        .bind(reason)
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Increment the retry counter without touching the status.
    pub async fn bump_retry<'e>(
        &self,
        db: impl PgExecutor<'e>,
        id: Uuid,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE command SET retries = retries + 1, last_error = $1, updated_at = now() WHERE id = $2",
        )
        .bind(error)
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Mark RUNNING commands whose lease expired as TIMED_OUT and return
    /// their ids. The conditional update never touches terminal states.
    pub async fn time_out_expired_leases<'e>(
        &self,
        db: impl PgExecutor<'e>,
        reason: &str,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            UPDATE command
            SET status = 'TIMED_OUT', last_error = $1, updated_at = now()
            WHERE status = 'RUNNING' AND processing_lease_until < now()
            RETURNING id
            "#,
        )
        .bind(reason)
        .fetch_all(db)
        .await
    }

    pub async fn exists_by_idempotency_key<'e>(
        &self,
        db: impl PgExecutor<'e>,
        key: &str,
    ) -> Result<bool, sqlx::Error> {
        let found: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM command WHERE idempotency_key = $1")
                .bind(key)
                .fetch_optional(db)
                .await?;
        Ok(found.is_some())
    }
}

fn classify_unique_violation(e: sqlx::Error) -> SaveCommandError {
    if let sqlx::Error::Database(ref db) = e {
        match db.constraint() {
            Some("command_idempotency_key_key") => return SaveCommandError::DuplicateIdempotency,
            Some("command_name_business_key_key") => return SaveCommandError::DuplicateBusiness,
            _ => {}
        }
    }
    SaveCommandError::Db(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_like_the_schema_enum() {
        let json = serde_json::to_string(&CommandStatus::TimedOut).unwrap();
        assert_eq!(json, "\"TIMED_OUT\"");
        let json = serde_json::to_string(&CommandStatus::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
    }

    #[test]
    fn non_constraint_errors_pass_through() {
        let err = classify_unique_violation(sqlx::Error::RowNotFound);
        assert!(matches!(err, SaveCommandError::Db(_)));
    }
}

//! Outbox persistence: pending outbound dispatches and their claim lifecycle.
//!
//! Rows move NEW -> CLAIMED -> PUBLISHED. `PUBLISHED` is terminal; a failed
//! publish sends a claimed row back to NEW with a future `next_at`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgExecutor;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "outbox_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutboxCategory {
    /// Outbound request to a command queue.
    Command,
    /// Point-to-point response to the submitter's reply destination.
    Reply,
    /// Broadcast notification on the event bus.
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "outbox_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OutboxStatus {
    New,
    Claimed,
    Published,
}

/// A message staged for dispatch, as produced by the row factory.
/// `payload` stays opaque JSON text; only `headers` are structured.
#[derive(Debug, Clone)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub category: OutboxCategory,
    pub topic: String,
    pub key: String,
    pub message_type: String,
    pub payload: String,
    pub headers: HashMap<String, String>,
}

/// A claimed outbox row, ready for transport dispatch.
#[derive(FromRow, Debug, Clone)]
pub struct OutboxRow {
    pub id: Uuid,
    pub category: OutboxCategory,
    pub topic: String,
    pub key: String,
    #[sqlx(rename = "type")]
    pub message_type: String,
    pub payload: String,
    pub headers: Json<HashMap<String, String>>,
    pub attempts: i32,
}

/// Row operations for the `outbox` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutboxStore;

impl OutboxStore {
    pub fn new() -> Self {
        Self
    }

    /// Insert a row with status NEW and return its id.
    pub async fn add_returning_id<'e>(
        &self,
        db: impl PgExecutor<'e>,
        message: &OutboxMessage,
    ) -> Result<Uuid, sqlx::Error> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO outbox (id, category, topic, key, type, payload, headers, status, attempts)
            VALUES ($1, $2, $3, $4, $5, $6::jsonb, $7, 'NEW', 0)
            RETURNING id
            "#,
        )
        .bind(message.id)
        .bind(message.category)
        .bind(&message.topic)
        .bind(&message.key)
        .bind(&message.message_type)
        .bind(&message.payload)
        .bind(Json(&message.headers))
        .fetch_one(db)
        .await?;
        Ok(id)
    }

    /// Claim a single row by id if it is still NEW. Used by the fast path;
    /// losing the race to a sweep is fine and yields `None`.
    pub async fn claim_one<'e>(
        &self,
        db: impl PgExecutor<'e>,
        id: Uuid,
        claimer: &str,
    ) -> Result<Option<OutboxRow>, sqlx::Error> {
        sqlx::query_as::<_, OutboxRow>(
            r#"
            UPDATE outbox SET status = 'CLAIMED', claimed_by = $1
            WHERE id = $2 AND status = 'NEW'
            RETURNING id, category, topic, key, type, payload::text AS payload, headers, attempts
            "#,
        )
        .bind(claimer)
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Atomically claim up to `max` eligible NEW rows in insertion order,
    /// skipping rows another worker holds locked. Never hands the same row
    /// to two callers.
    pub async fn claim<'e>(
        &self,
        db: impl PgExecutor<'e>,
        max: i64,
        claimer: &str,
    ) -> Result<Vec<OutboxRow>, sqlx::Error> {
        sqlx::query_as::<_, OutboxRow>(
            r#"
            WITH eligible AS (
                SELECT id FROM outbox
                WHERE status = 'NEW' AND (next_at IS NULL OR next_at <= now())
                ORDER BY created_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE outbox o SET status = 'CLAIMED', claimed_by = $2
            FROM eligible e WHERE o.id = e.id
            RETURNING o.id, o.category, o.topic, o.key, o.type,
                      o.payload::text AS payload, o.headers, o.attempts
            "#,
        )
        .bind(max)
        .bind(claimer)
        .fetch_all(db)
        .await
    }

    /// Advance a row to the terminal PUBLISHED state. Accepts NEW as well
    /// as CLAIMED so a send that raced its own claim cannot be lost, but
    /// never resurrects an already-published row.
    pub async fn mark_published<'e>(
        &self,
        db: impl PgExecutor<'e>,
        id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE outbox SET status = 'PUBLISHED', published_at = now()
            WHERE id = $1 AND status IN ('NEW', 'CLAIMED')
            "#,
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Send a claimed row back to NEW with a future `next_at`, bumping the
    /// attempt counter and recording the publish error.
    pub async fn reschedule<'e>(
        &self,
        db: impl PgExecutor<'e>,
        id: Uuid,
        backoff_millis: u64,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'NEW', attempts = attempts + 1,
                next_at = now() + ($1 || ' milliseconds')::interval,
                last_error = $2
            WHERE id = $3 AND status = 'CLAIMED'
            "#,
        )
        .bind(backoff_millis.to_string())
        .bind(error)
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&OutboxCategory::Command).unwrap(),
            "\"command\""
        );
        assert_eq!(
            serde_json::to_string(&OutboxCategory::Event).unwrap(),
            "\"event\""
        );
    }

    #[test]
    fn status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&OutboxStatus::Published).unwrap(),
            "\"PUBLISHED\""
        );
    }
}

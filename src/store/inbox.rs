//! Inbox dedup: records which messages a handler has already processed.

use sqlx::postgres::PgExecutor;

/// Row operations for the `inbox` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct InboxStore;

impl InboxStore {
    pub fn new() -> Self {
        Self
    }

    /// Insert `(message_id, handler)` if absent. Returns true when this is
    /// the first time the handler sees the message. The insert rides the
    /// caller's transaction, so it is linearizable with any side effects
    /// committed alongside it.
    pub async fn mark_if_absent<'e>(
        &self,
        db: impl PgExecutor<'e>,
        message_id: &str,
        handler: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO inbox (message_id, handler) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(message_id)
        .bind(handler)
        .execute(db)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

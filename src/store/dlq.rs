//! Dead-letter parking for commands that failed permanently.

use sqlx::postgres::PgExecutor;
use uuid::Uuid;

/// Everything recorded about a permanently failed command.
#[derive(Debug, Clone)]
pub struct ParkedCommand<'a> {
    pub command_id: Uuid,
    pub command_name: &'a str,
    pub business_key: &'a str,
    pub payload: &'a str,
    pub failed_status: &'a str,
    pub error_class: &'a str,
    pub error_message: &'a str,
    pub attempts: i32,
    pub parked_by: &'a str,
}

/// Row operations for the `command_dlq` table. Insert-only: entries are
/// never mutated, and the insert must ride the same transaction that marks
/// the command FAILED.
#[derive(Debug, Clone, Copy, Default)]
pub struct DlqStore;

impl DlqStore {
    pub fn new() -> Self {
        Self
    }

    pub async fn park<'e>(
        &self,
        db: impl PgExecutor<'e>,
        entry: &ParkedCommand<'_>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO command_dlq (command_id, command_name, business_key, payload,
                                     failed_status, error_class, error_message, attempts, parked_by)
            VALUES ($1, $2, $3, $4::jsonb, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.command_id)
        .bind(entry.command_name)
        .bind(entry.business_key)
        .bind(entry.payload)
        .bind(entry.failed_status)
        .bind(entry.error_class)
        .bind(entry.error_message)
        .bind(entry.attempts)
        .bind(entry.parked_by)
        .execute(db)
        .await?;
        Ok(())
    }
}

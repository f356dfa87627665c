//! Liveness endpoint reporting the engine's drain state.

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::kernel::CourierDeps;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    /// Outbox rows not yet PUBLISHED, when the database answered.
    outbox_backlog: Option<i64>,
    /// Age in seconds of the oldest unpublished row. A value that keeps
    /// growing past the sweep interval means the relay is stuck.
    oldest_unpublished_seconds: Option<i64>,
}

/// GET /health
///
/// The backlog probe doubles as the database check: this service is
/// healthy when it can reach its store and the outbox is draining.
pub async fn health_handler(
    Extension(deps): Extension<CourierDeps>,
) -> (StatusCode, Json<HealthResponse>) {
    let probe: Result<(i64, Option<f64>), sqlx::Error> = sqlx::query_as(
        "SELECT count(*), date_part('epoch', now() - min(created_at)) \
         FROM outbox WHERE status <> 'PUBLISHED'",
    )
    .fetch_one(&deps.db_pool)
    .await;

    match probe {
        Ok((backlog, oldest)) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                outbox_backlog: Some(backlog),
                oldest_unpublished_seconds: oldest.map(|secs| secs as i64),
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy".to_string(),
                outbox_backlog: None,
                oldest_unpublished_seconds: None,
            }),
        ),
    }
}

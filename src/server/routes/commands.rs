//! Command ingest and lookup endpoints.

use std::collections::HashMap;

use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::core::AcceptError;
use crate::kernel::CourierDeps;

/// POST /commands/{name}
///
/// Requires an `Idempotency-Key` header; `Reply-To` optionally overrides
/// the reply destination. Waits the configured sync window for the reply,
/// then degrades to 202 — the command still completes in the background.
pub async fn submit_command(
    Extension(deps): Extension<CourierDeps>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(idempotency_key) = header_value(&headers, "Idempotency-Key") else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Idempotency-Key header is required" })),
        )
            .into_response();
    };

    // Payloads stay opaque strings past this point, but they are persisted
    // as jsonb, so malformed JSON is a client error, not a 500.
    let Ok(parsed_body) = serde_json::from_str::<serde_json::Value>(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "request body must be valid JSON" })),
        )
            .into_response();
    };

    let reply_to = header_value(&headers, "Reply-To")
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| deps.config.naming.reply_queue.clone());

    let business_key = derive_business_key(&parsed_body);
    let reply_meta = HashMap::from([
        ("mode".to_string(), "queue".to_string()),
        ("replyTo".to_string(), reply_to),
    ]);

    let command_id = match deps
        .bus
        .accept(&name, &idempotency_key, &business_key, &body, &reply_meta)
        .await
    {
        Ok(id) => id,
        Err(e @ AcceptError::DuplicateIdempotency) | Err(e @ AcceptError::DuplicateBusiness) => {
            return (StatusCode::CONFLICT, Json(json!({ "error": e.to_string() })))
                .into_response();
        }
        Err(AcceptError::Internal(e)) => {
            error!(name = %name, error = %e, "command ingest failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
                .into_response();
        }
    };

    let id_headers = [
        ("X-Command-Id", command_id.to_string()),
        ("X-Correlation-Id", command_id.to_string()),
    ];

    if deps.config.timeouts.is_async() {
        return (StatusCode::ACCEPTED, id_headers, accepted_body()).into_response();
    }

    let slot = deps.responses.register(command_id).await;
    match tokio::time::timeout(deps.config.timeouts.sync_wait, slot).await {
        Ok(Ok(Ok(response))) => (
            StatusCode::OK,
            [
                ("X-Command-Id", command_id.to_string()),
                ("X-Correlation-Id", command_id.to_string()),
                ("Content-Type", "application/json".to_string()),
            ],
            response,
        )
            .into_response(),
        Ok(Ok(Err(error))) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            id_headers,
            Json(json!({ "error": error })),
        )
            .into_response(),
        // Slot timed out or expired: the reply will arrive asynchronously.
        _ => (StatusCode::ACCEPTED, id_headers, accepted_body()).into_response(),
    }
}

/// GET /commands/{id}
pub async fn get_command(
    Extension(deps): Extension<CourierDeps>,
    Path(id): Path<String>,
) -> Response {
    let Ok(command_id) = Uuid::parse_str(&id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "command not found" })),
        )
            .into_response();
    };

    match deps.command_store.find(&deps.db_pool, command_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "command not found" })),
        )
            .into_response(),
        Err(e) => {
            error!(command_id = %command_id, error = %e, "command lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
                .into_response()
        }
    }
}

fn accepted_body() -> Json<serde_json::Value> {
    Json(json!({ "message": "command accepted, processing asynchronously" }))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Honor an explicit business key in the body; otherwise mint one so the
/// `(name, business_key)` uniqueness constraint never trips by accident.
fn derive_business_key(body: &serde_json::Value) -> String {
    if let Some(key) = body
        .get("businessKey")
        .or_else(|| body.get("key"))
        .and_then(|v| v.as_str())
    {
        if !key.is_empty() {
            return key.to_string();
        }
    }
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(body: &str) -> serde_json::Value {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn explicit_business_key_is_honored() {
        assert_eq!(derive_business_key(&parsed(r#"{"businessKey":"biz-9"}"#)), "biz-9");
        assert_eq!(derive_business_key(&parsed(r#"{"key":"k-1"}"#)), "k-1");
    }

    #[test]
    fn missing_business_key_gets_a_fresh_one() {
        let a = derive_business_key(&parsed(r#"{"username":"alice"}"#));
        let b = derive_business_key(&parsed(r#"{"username":"alice"}"#));
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn empty_business_key_gets_a_fresh_one() {
        assert!(Uuid::parse_str(&derive_business_key(&parsed(r#"{"key":""}"#))).is_ok());
    }
}

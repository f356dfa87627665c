//! Shared helpers for the database-backed tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use courier::config::{Config, Naming, Timeouts};
use courier::core::{Envelope, HandlerFailure, HandlerRegistry};
use courier::handlers;
use courier::kernel::{CourierDeps, TestCommandQueue, TestEventPublisher};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

pub struct TestHarness {
    pub deps: CourierDeps,
    pub queue: Arc<TestCommandQueue>,
    pub events: Arc<TestEventPublisher>,
    pub pool: PgPool,
}

pub async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to connect to the test database");
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("failed to run migrations");
    pool
}

pub fn test_config() -> Config {
    Config {
        database_url: String::new(),
        nats_url: String::new(),
        port: 0,
        naming: Naming::default(),
        timeouts: Timeouts::default(),
        sweep_interval: Duration::from_secs(30),
        sweep_batch_size: 100,
        lease_reap_interval: Duration::from_secs(60),
        command_names: vec!["CreateUser".to_string()],
    }
}

pub async fn harness() -> TestHarness {
    harness_with_registry(handlers::default_registry()).await
}

pub async fn harness_with_registry(registry: HandlerRegistry) -> TestHarness {
    let pool = test_pool().await;
    let queue = Arc::new(TestCommandQueue::new());
    let events = Arc::new(TestEventPublisher::new());
    let deps = CourierDeps::new(
        pool.clone(),
        test_config(),
        queue.clone(),
        events.clone(),
        registry,
    );
    TestHarness {
        deps,
        queue,
        events,
        pool,
    }
}

/// CreateUser semantics plus an invocation counter, for at-most-once
/// assertions.
pub fn counting_create_user_registry(counter: Arc<AtomicUsize>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register("CreateUser", move |payload: String| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            if payload.contains("\"failPermanent\"") {
                return Err(HandlerFailure::Permanent("Invariant broken".to_string()));
            }
            if payload.contains("\"failTransient\"") {
                return Err(HandlerFailure::Transient("Downstream timeout".to_string()));
            }
            Ok(r#"{"userId":"u-123"}"#.to_string())
        }
    });
    registry
}

/// Envelope as the command consumer would build it from a queue delivery.
pub fn envelope(
    command_id: Uuid,
    business_key: &str,
    payload: &str,
    reply_to: Option<&str>,
) -> Envelope {
    let mut headers = HashMap::new();
    headers.insert("commandId".to_string(), command_id.to_string());
    headers.insert("commandName".to_string(), "CreateUser".to_string());
    headers.insert("businessKey".to_string(), business_key.to_string());
    if let Some(reply_to) = reply_to {
        headers.insert("replyTo".to_string(), reply_to.to_string());
    }

    Envelope {
        message_id: command_id,
        message_type: "CommandRequested".to_string(),
        name: "CreateUser".to_string(),
        command_id,
        correlation_id: command_id,
        causation_id: command_id,
        occurred_at: Utc::now(),
        key: business_key.to_string(),
        headers,
        payload: payload.to_string(),
    }
}

/// Poll until the condition holds or ~2.5s elapse.
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..50 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

pub async fn outbox_status(pool: &PgPool, id: Uuid) -> Option<String> {
    sqlx::query_scalar::<_, String>("SELECT status::text FROM outbox WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .expect("outbox status query failed")
}

pub async fn outbox_ids_for_topic(pool: &PgPool, topic: &str) -> Vec<Uuid> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM outbox WHERE topic = $1 ORDER BY created_at")
        .bind(topic)
        .fetch_all(pool)
        .await
        .expect("outbox topic query failed")
}

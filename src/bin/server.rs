//! Courier server: HTTP ingest, command consumers, and the outbox sweeper.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use courier::config::Config;
use courier::consume::{CommandConsumer, ReplyConsumer};
use courier::core::{LeaseReaper, OutboxSweeper};
use courier::handlers;
use courier::kernel::{
    CommandQueue, CourierDeps, EventPublisher, NatsCommandQueue, NatsEventPublisher,
};
use courier::server::build_router;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,courier=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    tracing::info!("starting courier");

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    sqlx::migrate!()
        .run(&pool)
        .await
        .context("failed to run database migrations")?;

    let nats = async_nats::connect(&config.nats_url)
        .await
        .context("failed to connect to NATS")?;
    let queue: Arc<dyn CommandQueue> = Arc::new(NatsCommandQueue::new(nats.clone()));
    let events: Arc<dyn EventPublisher> = Arc::new(NatsEventPublisher::new(nats.clone()));

    let deps = CourierDeps::new(
        pool,
        config.clone(),
        queue,
        events,
        handlers::default_registry(),
    );

    for name in &config.command_names {
        tracing::info!(
            command = %name,
            queue = %config.naming.command_queue(name),
            topic = %config.naming.event_topic(name),
            "serving command"
        );
    }

    let command_consumer = CommandConsumer::new(
        nats.clone(),
        deps.executor.clone(),
        config.naming.clone(),
        config.command_names.clone(),
    );
    let command_shutdown = command_consumer.shutdown_handle();
    tokio::spawn(command_consumer.run());

    let reply_consumer = ReplyConsumer::new(
        nats,
        deps.responses.clone(),
        config.naming.reply_queue.clone(),
    );
    let reply_shutdown = reply_consumer.shutdown_handle();
    tokio::spawn(reply_consumer.run());

    let sweeper = OutboxSweeper::new(deps.relay.clone(), config.sweep_interval);
    let sweeper_shutdown = sweeper.shutdown_handle();
    tokio::spawn(sweeper.run());

    let reaper = LeaseReaper::new(
        deps.db_pool.clone(),
        deps.command_store,
        config.lease_reap_interval,
    );
    let reaper_shutdown = reaper.shutdown_handle();
    tokio::spawn(reaper.run());

    let app = build_router(deps);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            command_shutdown.store(true, Ordering::SeqCst);
            reply_shutdown.store(true, Ordering::SeqCst);
            sweeper_shutdown.store(true, Ordering::SeqCst);
            reaper_shutdown.store(true, Ordering::SeqCst);
        })
        .await
        .context("server error")?;

    Ok(())
}

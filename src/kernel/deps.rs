//! Dependency container for the service.
//!
//! Explicit constructor injection: the composition root assembles stores,
//! relay, bus, and executor once, and everything downstream (routes,
//! consumers, background services) borrows from here. Tests build the same
//! container with the recording transport doubles.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::core::{
    CommandBus, Executor, FastPathPublisher, HandlerRegistry, OutboxRows, Relay,
};
use crate::store::{CommandStore, DlqStore, InboxStore, OutboxStore};

use super::command_queue::CommandQueue;
use super::event_bus::EventPublisher;
use super::response_registry::ResponseRegistry;

/// Identity stamped on outbox claims and DLQ entries by this process.
pub fn worker_identity() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| format!("worker-{}", Uuid::new_v4()))
}

#[derive(Clone)]
pub struct CourierDeps {
    pub db_pool: PgPool,
    pub config: Arc<Config>,
    pub bus: Arc<CommandBus>,
    pub executor: Arc<Executor>,
    pub relay: Arc<Relay>,
    pub responses: ResponseRegistry,
    pub command_store: CommandStore,
}

impl CourierDeps {
    /// Wire the engine. The relay comes first (the fast path needs it),
    /// then the bus and executor share the fast path and row factory.
    pub fn new(
        db_pool: PgPool,
        config: Config,
        queue: Arc<dyn CommandQueue>,
        events: Arc<dyn EventPublisher>,
        handlers: HandlerRegistry,
    ) -> Self {
        let worker_id = worker_identity();
        let rows = OutboxRows::new(config.naming.clone());

        let relay = Arc::new(Relay::new(
            db_pool.clone(),
            OutboxStore::new(),
            queue,
            events,
            config.timeouts.max_backoff,
            config.sweep_batch_size,
            worker_id.clone(),
        ));
        let fast_path = FastPathPublisher::new(relay.clone());

        let bus = Arc::new(CommandBus::new(
            db_pool.clone(),
            CommandStore::new(),
            OutboxStore::new(),
            rows.clone(),
            fast_path.clone(),
        ));

        let executor = Arc::new(Executor::new(
            db_pool.clone(),
            InboxStore::new(),
            CommandStore::new(),
            OutboxStore::new(),
            DlqStore::new(),
            rows,
            Arc::new(handlers),
            fast_path,
            config.naming.clone(),
            config.timeouts.command_lease,
            worker_id,
        ));

        let slot_ttl = if config.timeouts.sync_wait.is_zero() {
            Duration::from_secs(2)
        } else {
            config.timeouts.sync_wait
        };
        let responses = ResponseRegistry::new(slot_ttl);

        Self {
            db_pool,
            config: Arc::new(config),
            bus,
            executor,
            relay,
            responses,
            command_store: CommandStore::new(),
        }
    }
}

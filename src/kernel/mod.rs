//! Infrastructure seams: transport clients, the dependency container, and
//! the in-memory response registry.

mod command_queue;
mod deps;
mod event_bus;
mod response_registry;

pub use command_queue::{CommandQueue, NatsCommandQueue, SentMessage, TestCommandQueue};
pub use deps::{worker_identity, CourierDeps};
pub use event_bus::{
    EventPublisher, NatsEventPublisher, PublishedEvent, TestEventPublisher, ROUTING_KEY_HEADER,
};
pub use response_registry::{ReplyResult, ResponseRegistry};

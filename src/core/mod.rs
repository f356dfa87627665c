//! The reliable-messaging engine: ingest, execution, and publication.

pub mod aggregates;
mod bus;
mod envelope;
mod executor;
mod failure;
mod fast_path;
mod handler;
mod recovery;
mod relay;
mod rows;
mod sweeper;

pub use bus::{AcceptError, CommandBus};
pub use envelope::Envelope;
pub use executor::{Executor, Outcome, HANDLER_NAME};
pub use failure::HandlerFailure;
pub use fast_path::FastPathPublisher;
pub use handler::HandlerRegistry;
pub use recovery::LeaseReaper;
pub use relay::{backoff_millis, Relay};
pub use rows::OutboxRows;
pub use sweeper::OutboxSweeper;

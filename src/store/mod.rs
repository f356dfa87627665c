//! Persistence layer: four stores over Postgres plus the unit-of-work
//! handle they share. Every operation runs on whichever executor the
//! caller passes, so the stores join an ambient transaction through
//! [`UnitOfWork::conn`] and run standalone on a pool.

mod command;
mod dlq;
mod inbox;
mod outbox;
mod uow;

pub use command::{CommandRecord, CommandStatus, CommandStore, SaveCommandError};
pub use dlq::{DlqStore, ParkedCommand};
pub use inbox::InboxStore;
pub use outbox::{OutboxCategory, OutboxMessage, OutboxRow, OutboxStatus, OutboxStore};
pub use uow::UnitOfWork;

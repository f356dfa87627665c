//! Inbound message consumption.

mod consumers;

pub use consumers::{CommandConsumer, ReplyConsumer};

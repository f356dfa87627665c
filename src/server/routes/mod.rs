mod commands;
mod health;

pub use commands::{get_command, submit_command};
pub use health::health_handler;

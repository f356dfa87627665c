//! Command handlers wired at startup.

pub mod create_user;

use crate::core::HandlerRegistry;

/// Registry with every built-in handler registered.
pub fn default_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    create_user::register(&mut registry);
    registry
}

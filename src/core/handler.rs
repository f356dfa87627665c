//! Handler registry: command name -> async handler function.
//!
//! Handlers receive the opaque payload text and return result JSON or one
//! of the closed [`HandlerFailure`] kinds. The registry is populated at
//! startup and never mutated afterwards.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use super::failure::HandlerFailure;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<String, HandlerFailure>> + Send>>;
type BoxedHandler = Box<dyn Fn(String) -> HandlerFuture + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, BoxedHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a command name. Last registration wins.
    pub fn register<F, Fut>(&mut self, name: &'static str, handler: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, HandlerFailure>> + Send + 'static,
    {
        self.handlers
            .insert(name, Box::new(move |payload| Box::pin(handler(payload))));
    }

    /// Dispatch to the handler for `name`. An unregistered name is a
    /// permanent failure: no redelivery will make the handler appear.
    pub async fn invoke(&self, name: &str, payload: &str) -> Result<String, HandlerFailure> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| HandlerFailure::Permanent(format!("unknown command: {}", name)))?;
        handler(payload.to_string()).await
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn registered_names(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registered_handler_is_invoked_with_payload() {
        let mut registry = HandlerRegistry::new();
        registry.register("Echo", |payload| async move { Ok(payload) });

        let result = registry.invoke("Echo", r#"{"a":1}"#).await.unwrap();
        assert_eq!(result, r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn unknown_command_is_a_permanent_failure() {
        let registry = HandlerRegistry::new();
        let err = registry.invoke("Missing", "{}").await.unwrap_err();
        assert!(matches!(err, HandlerFailure::Permanent(_)));
        assert!(err.message().contains("Missing"));
    }

    #[tokio::test]
    async fn handler_failures_pass_through_untouched() {
        let mut registry = HandlerRegistry::new();
        registry.register("Flaky", |_| async {
            Err(HandlerFailure::Transient("downstream timeout".into()))
        });

        let err = registry.invoke("Flaky", "{}").await.unwrap_err();
        assert_eq!(err, HandlerFailure::Transient("downstream timeout".into()));
    }

    #[test]
    fn is_registered_reflects_registrations() {
        let mut registry = HandlerRegistry::new();
        registry.register("Known", |_| async { Ok(String::new()) });
        assert!(registry.is_registered("Known"));
        assert!(!registry.is_registered("Unknown"));
    }
}

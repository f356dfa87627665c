//! In-memory one-shot reply slots, used to turn asynchronous replies into
//! a bounded synchronous HTTP response.
//!
//! This is an optimization: a lost slot, an expired TTL, or a crash simply
//! degrades the submitter to the asynchronous acceptance path. Nothing
//! here affects correctness of the command's execution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

/// What a waiter receives: the reply payload, or an error message.
pub type ReplyResult = Result<String, String>;

/// Process-wide map from command id to a pending one-shot slot.
/// Thread-safe and cloneable; bounded by in-flight requests plus the TTL.
#[derive(Clone)]
pub struct ResponseRegistry {
    pending: Arc<Mutex<HashMap<Uuid, oneshot::Sender<ReplyResult>>>>,
    ttl: Duration,
}

impl ResponseRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Register a slot for `command_id`. The slot self-removes after the
    /// TTL whether or not a completer ever arrives; an expired waiter sees
    /// its channel close.
    pub async fn register(&self, command_id: Uuid) -> oneshot::Receiver<ReplyResult> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(command_id, tx);

        let pending = self.pending.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            pending.lock().await.remove(&command_id);
        });

        rx
    }

    /// Complete the slot for `command_id` if one is still pending;
    /// otherwise the response is silently discarded.
    pub async fn complete(&self, command_id: Uuid, response: String) {
        if let Some(tx) = self.pending.lock().await.remove(&command_id) {
            let _ = tx.send(Ok(response));
        }
    }

    /// Fail the slot for `command_id` if one is still pending.
    pub async fn fail(&self, command_id: Uuid, error: String) {
        if let Some(tx) = self.pending.lock().await.remove(&command_id) {
            let _ = tx.send(Err(error));
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_delivers_to_the_waiter() {
        let registry = ResponseRegistry::new(Duration::from_secs(2));
        let id = Uuid::new_v4();
        let rx = registry.register(id).await;

        registry.complete(id, r#"{"userId":"u-123"}"#.to_string()).await;

        assert_eq!(rx.await.unwrap(), Ok(r#"{"userId":"u-123"}"#.to_string()));
        assert_eq!(registry.pending_count().await, 0);
    }

    #[tokio::test]
    async fn fail_delivers_the_error() {
        let registry = ResponseRegistry::new(Duration::from_secs(2));
        let id = Uuid::new_v4();
        let rx = registry.register(id).await;

        registry.fail(id, "Invariant broken".to_string()).await;

        assert_eq!(rx.await.unwrap(), Err("Invariant broken".to_string()));
    }

    #[tokio::test]
    async fn completing_an_unknown_id_is_silent() {
        let registry = ResponseRegistry::new(Duration::from_secs(2));
        registry.complete(Uuid::new_v4(), "{}".to_string()).await;
        assert_eq!(registry.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slot_expires_when_no_completer_arrives() {
        let registry = ResponseRegistry::new(Duration::from_millis(50));
        let rx = registry.register(Uuid::new_v4()).await;

        // The TTL task drops the sender, closing the channel.
        assert!(rx.await.is_err());
        assert_eq!(registry.pending_count().await, 0);
    }

    #[tokio::test]
    async fn double_complete_only_delivers_once() {
        let registry = ResponseRegistry::new(Duration::from_secs(2));
        let id = Uuid::new_v4();
        let rx = registry.register(id).await;

        registry.complete(id, "first".to_string()).await;
        registry.complete(id, "second".to_string()).await;

        assert_eq!(rx.await.unwrap(), Ok("first".to_string()));
    }
}

//! Point-to-point command queue abstraction.
//!
//! Provides a trait-based queue client so the relay and consumers can swap
//! between a real NATS connection and a recording test double.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;

/// A message sent to a queue.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub queue: String,
    pub body: String,
    pub headers: HashMap<String, String>,
}

/// Trait for point-to-point sends. Headers are stringly typed application
/// properties; `replyTo` additionally maps to the broker's native reply
/// destination.
#[async_trait]
pub trait CommandQueue: Send + Sync {
    async fn send(&self, queue: &str, body: &str, headers: &HashMap<String, String>) -> Result<()>;
}

/// Real NATS-backed queue client.
pub struct NatsCommandQueue {
    client: async_nats::Client,
}

impl NatsCommandQueue {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommandQueue for NatsCommandQueue {
    async fn send(&self, queue: &str, body: &str, headers: &HashMap<String, String>) -> Result<()> {
        let mut header_map = async_nats::HeaderMap::new();
        for (name, value) in headers {
            header_map.insert(name.as_str(), value.as_str());
        }

        let payload = Bytes::copy_from_slice(body.as_bytes());
        match headers.get("replyTo").filter(|r| !r.is_empty()) {
            Some(reply_to) => {
                self.client
                    .publish_with_reply_and_headers(
                        queue.to_string(),
                        reply_to.clone(),
                        header_map,
                        payload,
                    )
                    .await?
            }
            None => {
                self.client
                    .publish_with_headers(queue.to_string(), header_map, payload)
                    .await?
            }
        }
        Ok(())
    }
}

/// Recording queue double for tests. Tracks every send and can be told to
/// fail, which exercises the relay's reschedule path.
#[derive(Default)]
pub struct TestCommandQueue {
    sent: RwLock<Vec<SentMessage>>,
    failing: AtomicBool,
}

impl TestCommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn messages_for_queue(&self, queue: &str) -> Vec<SentMessage> {
        self.sent
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| m.queue == queue)
            .cloned()
            .collect()
    }

    pub fn send_count(&self) -> usize {
        self.sent.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn clear(&self) {
        self.sent.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl CommandQueue for TestCommandQueue {
    async fn send(&self, queue: &str, body: &str, headers: &HashMap<String, String>) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("queue unavailable"));
        }
        self.sent
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage {
                queue: queue.to_string(),
                body: body.to_string(),
                headers: headers.clone(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_sends_per_queue() {
        let queue = TestCommandQueue::new();
        queue
            .send("APP.CMD.CreateUser.Q", "{}", &HashMap::new())
            .await
            .unwrap();
        queue
            .send("APP.CMD.REPLY.Q", "{}", &HashMap::new())
            .await
            .unwrap();

        assert_eq!(queue.send_count(), 2);
        assert_eq!(queue.messages_for_queue("APP.CMD.REPLY.Q").len(), 1);
    }

    #[tokio::test]
    async fn failing_mode_rejects_sends() {
        let queue = TestCommandQueue::new();
        queue.set_failing(true);
        assert!(queue.send("Q", "{}", &HashMap::new()).await.is_err());
        assert_eq!(queue.send_count(), 0);

        queue.set_failing(false);
        assert!(queue.send("Q", "{}", &HashMap::new()).await.is_ok());
        assert_eq!(queue.send_count(), 1);
    }
}

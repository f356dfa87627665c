//! Broadcast event bus abstraction.
//!
//! Same pattern as the command queue: a trait, a NATS-backed client, and a
//! recording double. The routing key must survive unchanged, so it rides a
//! dedicated header.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;

/// Header carrying the routing key on the wire.
pub const ROUTING_KEY_HEADER: &str = "routingKey";

/// A published event.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub topic: String,
    pub key: String,
    pub value: String,
    pub headers: HashMap<String, String>,
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        value: &str,
        headers: &HashMap<String, String>,
    ) -> Result<()>;
}

/// Real NATS-backed event publisher.
pub struct NatsEventPublisher {
    client: async_nats::Client,
}

impl NatsEventPublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventPublisher for NatsEventPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        value: &str,
        headers: &HashMap<String, String>,
    ) -> Result<()> {
        let mut header_map = async_nats::HeaderMap::new();
        for (name, header_value) in headers {
            header_map.insert(name.as_str(), header_value.as_str());
        }
        header_map.insert(ROUTING_KEY_HEADER, key);

        self.client
            .publish_with_headers(
                topic.to_string(),
                header_map,
                Bytes::copy_from_slice(value.as_bytes()),
            )
            .await?;
        Ok(())
    }
}

/// Recording event-bus double for tests.
#[derive(Default)]
pub struct TestEventPublisher {
    published: RwLock<Vec<PublishedEvent>>,
    failing: AtomicBool,
}

impl TestEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published_events(&self) -> Vec<PublishedEvent> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn events_for_topic(&self, topic: &str) -> Vec<PublishedEvent> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.topic == topic)
            .cloned()
            .collect()
    }

    pub fn publish_count(&self) -> usize {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl EventPublisher for TestEventPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        value: &str,
        headers: &HashMap<String, String>,
    ) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("event bus unavailable"));
        }
        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(PublishedEvent {
                topic: topic.to_string(),
                key: key.to_string(),
                value: value.to_string(),
                headers: headers.clone(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_events_with_keys() {
        let bus = TestEventPublisher::new();
        bus.publish("events.CreateUser", "k-1", "{}", &HashMap::new())
            .await
            .unwrap();

        let events = bus.events_for_topic("events.CreateUser");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, "k-1");
    }

    #[tokio::test]
    async fn failing_mode_rejects_publishes() {
        let bus = TestEventPublisher::new();
        bus.set_failing(true);
        assert!(bus.publish("t", "k", "{}", &HashMap::new()).await.is_err());
        assert_eq!(bus.publish_count(), 0);
    }
}

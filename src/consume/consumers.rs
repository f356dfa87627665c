//! Broker subscribers: command deliveries into the executor, replies into
//! the response registry.

use std::cmp;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::{select_all, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Naming;
use crate::core::{Envelope, Executor};
use crate::kernel::ResponseRegistry;

const EXECUTOR_GROUP: &str = "courier-executors";
const REPLY_GROUP: &str = "courier-replies";

/// Collect a delivery's headers into the envelope's string map. The native
/// reply destination folds into `replyTo` when the header is absent.
fn headers_to_map(message: &async_nats::Message) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(headers) = &message.headers {
        for (name, values) in headers.iter() {
            if let Some(value) = values.last() {
                map.insert(name.to_string(), value.as_str().to_string());
            }
        }
    }
    if let Some(reply) = &message.reply {
        map.entry("replyTo".to_string())
            .or_insert_with(|| reply.to_string());
    }
    map
}

/// In-process redelivery delay: 1s doubling per attempt, capped at 30s.
fn redelivery_delay(attempt: u32) -> Duration {
    let secs = 1u64 << cmp::min(attempt.saturating_sub(1), 5);
    Duration::from_secs(cmp::min(secs, 30))
}

/// Subscribes to every configured command queue and drives the executor.
///
/// A retryable processing failure is redelivered here with a growing delay
/// until the executor commits an outcome; the inbox makes redelivery safe.
pub struct CommandConsumer {
    client: async_nats::Client,
    executor: Arc<Executor>,
    naming: Naming,
    command_names: Vec<String>,
    shutdown: Arc<AtomicBool>,
}

impl CommandConsumer {
    pub fn new(
        client: async_nats::Client,
        executor: Arc<Executor>,
        naming: Naming,
        command_names: Vec<String>,
    ) -> Self {
        Self {
            client,
            executor,
            naming,
            command_names,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub async fn run(self) -> Result<()> {
        let mut subscribers = Vec::with_capacity(self.command_names.len());
        for name in &self.command_names {
            let queue = self.naming.command_queue(name);
            let subscriber = self
                .client
                .queue_subscribe(queue.clone(), EXECUTOR_GROUP.to_string())
                .await
                .with_context(|| format!("failed to subscribe to {}", queue))?;
            info!(queue = %queue, "consuming command queue");
            subscribers.push(subscriber);
        }

        let mut deliveries = select_all(subscribers);
        while let Some(message) = deliveries.next().await {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            self.handle_delivery(message).await;
        }

        info!("command consumer stopped");
        Ok(())
    }

    async fn handle_delivery(&self, message: async_nats::Message) {
        let queue = message.subject.to_string();
        let headers = headers_to_map(&message);
        let body = String::from_utf8_lossy(&message.payload).to_string();
        let envelope = Envelope::from_delivery(&queue, &body, headers, &self.naming);

        let mut attempt: u32 = 0;
        loop {
            match self.executor.process(&envelope).await {
                Ok(outcome) => {
                    debug!(
                        command_id = %envelope.command_id,
                        outcome = ?outcome,
                        "delivery processed"
                    );
                    return;
                }
                Err(e) => {
                    attempt += 1;
                    let delay = redelivery_delay(attempt);
                    warn!(
                        command_id = %envelope.command_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "processing failed, redelivering"
                    );
                    tokio::time::sleep(delay).await;
                    if self.shutdown.load(Ordering::SeqCst) {
                        return;
                    }
                }
            }
        }
    }
}

/// Subscribes to the reply queue and completes pending response slots.
pub struct ReplyConsumer {
    client: async_nats::Client,
    responses: ResponseRegistry,
    reply_queue: String,
    shutdown: Arc<AtomicBool>,
}

impl ReplyConsumer {
    pub fn new(client: async_nats::Client, responses: ResponseRegistry, reply_queue: String) -> Self {
        Self {
            client,
            responses,
            reply_queue,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub async fn run(self) -> Result<()> {
        let mut subscriber = self
            .client
            .queue_subscribe(self.reply_queue.clone(), REPLY_GROUP.to_string())
            .await
            .with_context(|| format!("failed to subscribe to {}", self.reply_queue))?;
        info!(queue = %self.reply_queue, "consuming reply queue");

        while let Some(message) = subscriber.next().await {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let headers = headers_to_map(&message);
            let Some(command_id) = headers.get("commandId").and_then(|v| Uuid::parse_str(v).ok())
            else {
                debug!("reply without a commandId header, discarding");
                continue;
            };

            let body = String::from_utf8_lossy(&message.payload).to_string();
            self.responses.complete(command_id, body).await;
        }

        info!("reply consumer stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redelivery_delay_grows_and_caps() {
        assert_eq!(redelivery_delay(1), Duration::from_secs(1));
        assert_eq!(redelivery_delay(2), Duration::from_secs(2));
        assert_eq!(redelivery_delay(4), Duration::from_secs(8));
        assert_eq!(redelivery_delay(10), Duration::from_secs(30));
    }
}

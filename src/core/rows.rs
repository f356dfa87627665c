//! Pure constructors for the three outbox row categories.

use std::collections::HashMap;

use uuid::Uuid;

use crate::config::Naming;
use crate::store::{OutboxCategory, OutboxMessage};

use super::envelope::Envelope;

/// Shapes outbox rows according to the configured naming conventions.
#[derive(Debug, Clone)]
pub struct OutboxRows {
    naming: Naming,
}

impl OutboxRows {
    pub fn new(naming: Naming) -> Self {
        Self { naming }
    }

    /// The outbound request written alongside a freshly accepted command.
    /// Reply metadata from the caller is merged with the command identity
    /// headers; the identity headers win on collision.
    pub fn command_requested(
        &self,
        name: &str,
        command_id: Uuid,
        business_key: &str,
        payload: &str,
        reply_meta: &HashMap<String, String>,
    ) -> OutboxMessage {
        let mut headers = reply_meta.clone();
        headers.insert("commandId".to_string(), command_id.to_string());
        headers.insert("commandName".to_string(), name.to_string());
        headers.insert("businessKey".to_string(), business_key.to_string());

        OutboxMessage {
            id: Uuid::new_v4(),
            category: OutboxCategory::Command,
            topic: self.naming.command_queue(name),
            key: business_key.to_string(),
            message_type: "CommandRequested".to_string(),
            payload: payload.to_string(),
            headers,
        }
    }

    /// A point-to-point reply routed to the envelope's `replyTo` header,
    /// falling back to the configured reply queue. Inherits the envelope
    /// headers and stamps the correlation id.
    pub fn reply(&self, env: &Envelope, message_type: &str, payload: String) -> OutboxMessage {
        let topic = env
            .headers
            .get("replyTo")
            .filter(|t| !t.is_empty())
            .cloned()
            .unwrap_or_else(|| self.naming.reply_queue.clone());

        let mut headers = env.headers.clone();
        headers.insert("correlationId".to_string(), env.correlation_id.to_string());

        OutboxMessage {
            id: Uuid::new_v4(),
            category: OutboxCategory::Reply,
            topic,
            key: env.key.clone(),
            message_type: message_type.to_string(),
            payload,
            headers,
        }
    }

    /// A broadcast event. The routing key is preserved verbatim.
    pub fn event(&self, topic: String, key: &str, message_type: &str, payload: String) -> OutboxMessage {
        OutboxMessage {
            id: Uuid::new_v4(),
            category: OutboxCategory::Event,
            topic,
            key: key.to_string(),
            message_type: message_type.to_string(),
            payload,
            headers: HashMap::new(),
        }
    }

    pub fn naming(&self) -> &Naming {
        &self.naming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rows() -> OutboxRows {
        OutboxRows::new(Naming::default())
    }

    fn envelope(headers: HashMap<String, String>) -> Envelope {
        let command_id = Uuid::new_v4();
        Envelope {
            message_id: command_id,
            message_type: "CommandRequested".to_string(),
            name: "CreateUser".to_string(),
            command_id,
            correlation_id: command_id,
            causation_id: command_id,
            occurred_at: Utc::now(),
            key: "biz-1".to_string(),
            headers,
            payload: "{}".to_string(),
        }
    }

    #[test]
    fn command_row_targets_the_derived_queue() {
        let id = Uuid::new_v4();
        let row = rows().command_requested("CreateUser", id, "biz-1", "{}", &HashMap::new());
        assert_eq!(row.category, OutboxCategory::Command);
        assert_eq!(row.topic, "APP.CMD.CreateUser.Q");
        assert_eq!(row.message_type, "CommandRequested");
        assert_eq!(row.headers.get("commandId"), Some(&id.to_string()));
        assert_eq!(
            row.headers.get("commandName"),
            Some(&"CreateUser".to_string())
        );
        assert_eq!(row.headers.get("businessKey"), Some(&"biz-1".to_string()));
    }

    #[test]
    fn command_row_merges_reply_metadata() {
        let mut reply_meta = HashMap::new();
        reply_meta.insert("replyTo".to_string(), "CUSTOM.REPLY.Q".to_string());
        reply_meta.insert("commandName".to_string(), "Spoofed".to_string());

        let row = rows().command_requested("CreateUser", Uuid::new_v4(), "k", "{}", &reply_meta);
        assert_eq!(row.headers.get("replyTo"), Some(&"CUSTOM.REPLY.Q".to_string()));
        // Identity headers win over caller metadata.
        assert_eq!(
            row.headers.get("commandName"),
            Some(&"CreateUser".to_string())
        );
    }

    #[test]
    fn reply_row_honors_reply_to_header() {
        let mut headers = HashMap::new();
        headers.insert("replyTo".to_string(), "CALLER.REPLY.Q".to_string());
        let env = envelope(headers);

        let row = rows().reply(&env, "CommandCompleted", "{}".to_string());
        assert_eq!(row.category, OutboxCategory::Reply);
        assert_eq!(row.topic, "CALLER.REPLY.Q");
        assert_eq!(
            row.headers.get("correlationId"),
            Some(&env.correlation_id.to_string())
        );
    }

    #[test]
    fn reply_row_falls_back_to_default_queue() {
        let env = envelope(HashMap::new());
        let row = rows().reply(&env, "CommandFailed", "{}".to_string());
        assert_eq!(row.topic, "APP.CMD.REPLY.Q");
    }

    #[test]
    fn event_row_preserves_key_and_has_no_headers() {
        let row = rows().event(
            "events.CreateUser".to_string(),
            "partition-7",
            "CommandCompleted",
            "{}".to_string(),
        );
        assert_eq!(row.category, OutboxCategory::Event);
        assert_eq!(row.key, "partition-7");
        assert!(row.headers.is_empty());
    }
}

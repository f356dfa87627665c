//! The inbound message envelope and its mapping from raw broker deliveries.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::Naming;

/// A command delivery as seen by the executor. `payload` is the raw message
/// body, untouched.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub message_id: Uuid,
    pub message_type: String,
    pub name: String,
    pub command_id: Uuid,
    pub correlation_id: Uuid,
    pub causation_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub key: String,
    pub headers: HashMap<String, String>,
    pub payload: String,
}

impl Envelope {
    /// Build an envelope from a raw delivery.
    ///
    /// Header fallbacks mirror the wire contract: a missing `commandId`
    /// gets a fresh id (the inbox then dedups on it), a missing
    /// `correlationId` falls back to the command id, the business key is
    /// taken from headers, then from a `key`/`businessKey` payload field,
    /// then from the command id, and the command name is recovered from
    /// the queue name when the header is absent.
    pub fn from_delivery(
        queue: &str,
        body: &str,
        headers: HashMap<String, String>,
        naming: &Naming,
    ) -> Self {
        let command_id = parse_uuid(headers.get("commandId")).unwrap_or_else(Uuid::new_v4);
        let correlation_id = parse_uuid(headers.get("correlationId")).unwrap_or(command_id);

        let business_key = headers
            .get("businessKey")
            .cloned()
            .or_else(|| key_from_payload(body))
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| command_id.to_string());

        let name = headers
            .get("commandName")
            .cloned()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| naming.command_name_from_queue(queue));

        Self {
            message_id: command_id,
            message_type: "CommandRequested".to_string(),
            name,
            command_id,
            correlation_id,
            causation_id: command_id,
            occurred_at: Utc::now(),
            key: business_key,
            headers,
            payload: body.to_string(),
        }
    }
}

fn parse_uuid(value: Option<&String>) -> Option<Uuid> {
    value.and_then(|v| Uuid::parse_str(v).ok())
}

/// Probe the body for a `key` or `businessKey` field. This is the one spot
/// the consume edge looks inside a payload; the core itself never does.
fn key_from_payload(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("key")
        .or_else(|| value.get("businessKey"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naming() -> Naming {
        Naming::default()
    }

    #[test]
    fn headers_drive_identity() {
        let command_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();
        let mut headers = HashMap::new();
        headers.insert("commandId".to_string(), command_id.to_string());
        headers.insert("correlationId".to_string(), correlation_id.to_string());
        headers.insert("commandName".to_string(), "CreateUser".to_string());
        headers.insert("businessKey".to_string(), "biz-1".to_string());

        let env = Envelope::from_delivery("APP.CMD.CreateUser.Q", "{}", headers, &naming());
        assert_eq!(env.command_id, command_id);
        assert_eq!(env.message_id, command_id);
        assert_eq!(env.correlation_id, correlation_id);
        assert_eq!(env.name, "CreateUser");
        assert_eq!(env.key, "biz-1");
    }

    #[test]
    fn correlation_falls_back_to_command_id() {
        let command_id = Uuid::new_v4();
        let mut headers = HashMap::new();
        headers.insert("commandId".to_string(), command_id.to_string());

        let env = Envelope::from_delivery("APP.CMD.CreateUser.Q", "{}", headers, &naming());
        assert_eq!(env.correlation_id, command_id);
        assert_eq!(env.causation_id, command_id);
    }

    #[test]
    fn name_recovered_from_queue_when_header_missing() {
        let env =
            Envelope::from_delivery("APP.CMD.ArchiveOrder.Q", "{}", HashMap::new(), &naming());
        assert_eq!(env.name, "ArchiveOrder");
    }

    #[test]
    fn business_key_probed_from_payload() {
        let env = Envelope::from_delivery(
            "APP.CMD.CreateUser.Q",
            r#"{"key":"from-body"}"#,
            HashMap::new(),
            &naming(),
        );
        assert_eq!(env.key, "from-body");

        let env = Envelope::from_delivery(
            "APP.CMD.CreateUser.Q",
            r#"{"businessKey":"alt-field"}"#,
            HashMap::new(),
            &naming(),
        );
        assert_eq!(env.key, "alt-field");
    }

    #[test]
    fn business_key_defaults_to_command_id() {
        let env = Envelope::from_delivery(
            "APP.CMD.CreateUser.Q",
            "not json at all",
            HashMap::new(),
            &naming(),
        );
        assert_eq!(env.key, env.command_id.to_string());
    }

    #[test]
    fn garbled_ids_fall_back_to_fresh_ones() {
        let mut headers = HashMap::new();
        headers.insert("commandId".to_string(), "not-a-uuid".to_string());

        let env = Envelope::from_delivery("APP.CMD.CreateUser.Q", "{}", headers, &naming());
        assert_eq!(env.correlation_id, env.command_id);
    }
}

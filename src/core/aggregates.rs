//! Aggregate snapshot for success events.

/// The snapshot JSON published with a `CommandCompleted` event. A real
/// deployment would read the aggregate's current state here; the payload
/// stays an opaque string to everything downstream.
pub fn snapshot(key: &str) -> String {
    serde_json::json!({ "aggregateKey": key, "version": 1 }).to_string()
}

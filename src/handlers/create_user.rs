//! Sample CreateUser handler exercising the full failure taxonomy.

use crate::core::{HandlerFailure, HandlerRegistry};

pub const COMMAND_NAME: &str = "CreateUser";

pub fn register(registry: &mut HandlerRegistry) {
    registry.register(COMMAND_NAME, |payload| async move { invoke(&payload) });
}

/// Sentinel fields drive the outcome: `failPermanent` violates a business
/// invariant, `failTransient` simulates a flaky downstream. Anything else
/// succeeds with the created user's id.
fn invoke(payload: &str) -> Result<String, HandlerFailure> {
    if payload.contains("\"failPermanent\"") {
        return Err(HandlerFailure::Permanent("Invariant broken".to_string()));
    }
    if payload.contains("\"failTransient\"") {
        return Err(HandlerFailure::Transient("Downstream timeout".to_string()));
    }
    Ok(r#"{"userId":"u-123"}"#.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_payload_succeeds() {
        let result = invoke(r#"{"username":"alice"}"#).unwrap();
        assert_eq!(result, r#"{"userId":"u-123"}"#);
    }

    #[test]
    fn fail_permanent_raises_a_permanent_failure() {
        let err = invoke(r#"{"failPermanent":true}"#).unwrap_err();
        assert_eq!(err, HandlerFailure::Permanent("Invariant broken".into()));
    }

    #[test]
    fn fail_transient_raises_a_transient_failure() {
        let err = invoke(r#"{"failTransient":true}"#).unwrap_err();
        assert_eq!(err, HandlerFailure::Transient("Downstream timeout".into()));
    }

    #[tokio::test]
    async fn registers_under_its_command_name() {
        let mut registry = HandlerRegistry::new();
        register(&mut registry);
        assert!(registry.is_registered(COMMAND_NAME));

        let result = registry.invoke(COMMAND_NAME, "{}").await.unwrap();
        assert!(result.contains("userId"));
    }
}

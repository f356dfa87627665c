//! The closed set of failure kinds a command handler may raise.

use thiserror::Error;

/// Handler failure taxonomy. The executor branches on the variant:
/// `Permanent` commits the failure state and parks the command, the other
/// two roll back and let the message layer redeliver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerFailure {
    /// A business invariant is violated; retrying cannot help.
    #[error("permanent failure: {0}")]
    Permanent(String),
    /// Business-level contention that a later delivery may resolve.
    #[error("retryable business failure: {0}")]
    RetryableBusiness(String),
    /// Infrastructure trouble (timeouts, unavailable dependencies).
    #[error("transient failure: {0}")]
    Transient(String),
}

impl HandlerFailure {
    /// Whether redelivery may change the outcome.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, HandlerFailure::Permanent(_))
    }

    /// Stable class label recorded in the DLQ.
    pub fn class(&self) -> &'static str {
        match self {
            HandlerFailure::Permanent(_) => "Permanent",
            HandlerFailure::RetryableBusiness(_) => "RetryableBusiness",
            HandlerFailure::Transient(_) => "Transient",
        }
    }

    /// The bare failure message, without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            HandlerFailure::Permanent(m)
            | HandlerFailure::RetryableBusiness(m)
            | HandlerFailure::Transient(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_is_not_retryable() {
        assert!(!HandlerFailure::Permanent("broken".into()).is_retryable());
    }

    #[test]
    fn business_and_transient_are_retryable() {
        assert!(HandlerFailure::RetryableBusiness("locked".into()).is_retryable());
        assert!(HandlerFailure::Transient("timeout".into()).is_retryable());
    }

    #[test]
    fn class_labels_are_stable() {
        assert_eq!(HandlerFailure::Permanent("x".into()).class(), "Permanent");
        assert_eq!(
            HandlerFailure::RetryableBusiness("x".into()).class(),
            "RetryableBusiness"
        );
        assert_eq!(HandlerFailure::Transient("x".into()).class(), "Transient");
    }

    #[test]
    fn message_strips_the_variant_prefix() {
        let failure = HandlerFailure::Transient("downstream timeout".into());
        assert_eq!(failure.message(), "downstream timeout");
        assert_eq!(failure.to_string(), "transient failure: downstream timeout");
    }
}

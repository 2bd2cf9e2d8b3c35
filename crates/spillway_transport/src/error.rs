//! Transport error types.

/// Transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Publishing a request failed
    #[error("Publish failed: {reason}")]
    PublishFailed {
        /// Backend-reported reason
        reason: String,
    },

    /// Polling the response queue failed
    #[error("Poll failed: {reason}")]
    PollFailed {
        /// Backend-reported reason
        reason: String,
    },

    /// Acknowledging a message failed
    #[error("Acknowledge failed: {reason}")]
    AcknowledgeFailed {
        /// Backend-reported reason
        reason: String,
    },

    /// Dead-lettering a message failed
    #[error("Dead-letter failed: {reason}")]
    DeadLetterFailed {
        /// Backend-reported reason
        reason: String,
    },

    /// The transport is closed
    #[error("Transport closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::PublishFailed {
            reason: "topic missing".to_string(),
        };
        assert!(err.to_string().contains("topic missing"));

        let err = TransportError::Closed;
        assert_eq!(err.to_string(), "Transport closed");
    }

    #[test]
    fn test_transport_error_equality() {
        assert_eq!(TransportError::Closed, TransportError::Closed);
        assert_ne!(
            TransportError::Closed,
            TransportError::PollFailed {
                reason: "x".to_string()
            }
        );
    }
}

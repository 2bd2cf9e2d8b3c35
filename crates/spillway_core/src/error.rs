//! Core error types for SPILLWAY.
//!
//! `CallError` is the caller-visible failure taxonomy: everything a caller
//! awaiting a remote call can observe. Engine-internal anomalies (unmatched
//! responses, transient poll failures) are absorbed and never appear here.

use std::fmt;

/// Result type for caller-visible call outcomes
pub type CallResult<T> = Result<T, CallError>;

/// Caller-visible call error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Envelope encoding or decoding failed
    Encoding {
        /// What failed to encode or decode
        reason: String,
    },

    /// Publishing the request to the transport failed
    Publish {
        /// Transport-reported reason
        reason: String,
    },

    /// The remote function reported a failure
    Remote {
        /// Error description from the execution side
        message: String,
    },

    /// The call was cancelled by an engine drain
    Cancelled,

    /// The engine is stopped and accepts no new calls
    EngineStopped,

    /// Internal error (for unexpected errors)
    Internal {
        /// Error message
        message: String,
    },
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding { reason } => write!(f, "Encoding failed: {}", reason),
            Self::Publish { reason } => write!(f, "Publish failed: {}", reason),
            Self::Remote { message } => write!(f, "Remote function failed: {}", message),
            Self::Cancelled => write!(f, "Call cancelled by drain"),
            Self::EngineStopped => write!(f, "Engine is stopped"),
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for CallError {}

impl From<serde_json::Error> for CallError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding {
            reason: err.to_string(),
        }
    }
}

//! Raw queue messages and control sentinels.
//!
//! Control messages carry no CallId and are distinguished by a transport
//! level `kind` attribute, so detecting one never requires parsing a body.

use serde::{Deserialize, Serialize};
use spillway_core::Timestamp;

/// Control tag that unblocks a blocking poll during drain
pub const CONTROL_STOP: &str = "stop";

/// Opaque handle a backend needs to acknowledge a delivered message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageReceipt(String);

impl MessageReceipt {
    /// Create a receipt from a backend token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the backend token
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageReceipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "receipt_{}", self.0)
    }
}

/// A raw message retrieved from the response queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Message body (a serialized response envelope, or empty for control)
    pub body: String,
    /// When the backend accepted the message, if reported
    pub sent_at: Option<Timestamp>,
    /// Receipt for acknowledgement
    pub receipt: MessageReceipt,
    /// Transport-level kind attribute; `None` for ordinary payloads
    pub kind: Option<String>,
}

impl QueueMessage {
    /// Create an ordinary payload message
    #[must_use]
    pub fn payload(body: impl Into<String>, receipt: MessageReceipt) -> Self {
        Self {
            body: body.into(),
            sent_at: Some(Timestamp::now()),
            receipt,
            kind: None,
        }
    }

    /// Create a control message with the given tag
    #[must_use]
    pub fn control(tag: &str) -> Self {
        Self {
            body: String::new(),
            sent_at: Some(Timestamp::now()),
            receipt: MessageReceipt::new(format!("control-{}", tag)),
            kind: Some(tag.to_string()),
        }
    }

    /// Check whether this message is a control sentinel with the given tag
    #[must_use]
    pub fn is_control(&self, tag: &str) -> bool {
        self.kind.as_deref() == Some(tag)
    }
}

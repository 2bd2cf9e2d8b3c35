//! Call envelopes - the wire shapes exchanged with the execution side.
//!
//! A `CallRequest` travels caller-to-backend; a `CallResponse` travels
//! backend-to-caller through the shared response queue. Both are JSON on
//! the wire. The response outcome is a tagged variant, never a loose
//! `success` flag plus optional error string.

use crate::error::{CallError, CallResult};
use crate::id::CallId;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Call request envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Correlation key for the eventual response
    pub call_id: CallId,
    /// Name of the remote function to invoke
    pub function_name: String,
    /// Ordered, JSON-representable argument values
    pub args: Vec<Value>,
    /// Opaque locator of the queue the response should be sent to
    pub response_destination: String,
}

impl CallRequest {
    /// Create a new call request with a fresh CallId and no arguments
    #[must_use]
    pub fn new(function_name: impl Into<String>, response_destination: impl Into<String>) -> Self {
        Self {
            call_id: CallId::new(),
            function_name: function_name.into(),
            args: Vec::new(),
            response_destination: response_destination.into(),
        }
    }

    /// Use a specific CallId
    #[must_use]
    pub fn with_call_id(mut self, call_id: CallId) -> Self {
        self.call_id = call_id;
        self
    }

    /// Append an argument
    #[must_use]
    pub fn with_arg(mut self, arg: Value) -> Self {
        self.args.push(arg);
        self
    }

    /// Replace the argument list
    #[must_use]
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Encode to a JSON string
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails
    pub fn to_json(&self) -> CallResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from a JSON string
    ///
    /// # Errors
    ///
    /// Returns error if the body is not a valid request envelope
    pub fn from_json(body: &str) -> CallResult<Self> {
        Ok(serde_json::from_str(body)?)
    }
}

/// Outcome of a remote execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Outcome {
    /// The function returned a value
    Returned {
        /// The returned value
        value: Value,
    },
    /// The function failed
    Failed {
        /// Error description from the execution side
        message: String,
    },
}

impl Outcome {
    /// Whether this outcome is a successful return
    #[must_use]
    pub const fn is_returned(&self) -> bool {
        matches!(self, Self::Returned { .. })
    }

    /// Convert into a caller-visible result
    #[must_use]
    pub fn into_result(self) -> CallResult<Value> {
        match self {
            Self::Returned { value } => Ok(value),
            Self::Failed { message } => Err(CallError::Remote { message }),
        }
    }
}

/// Call response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
    /// CallId this responds to
    pub call_id: CallId,
    /// Execution outcome
    #[serde(flatten)]
    pub outcome: Outcome,
    /// When execution started on the backend
    pub started_at: Timestamp,
    /// When execution finished on the backend
    pub finished_at: Timestamp,
}

impl CallResponse {
    /// Create a successful response
    #[must_use]
    pub fn returned(call_id: CallId, value: Value, started_at: Timestamp) -> Self {
        Self {
            call_id,
            outcome: Outcome::Returned { value },
            started_at,
            finished_at: Timestamp::now(),
        }
    }

    /// Create a failed response
    #[must_use]
    pub fn failed(call_id: CallId, message: impl Into<String>, started_at: Timestamp) -> Self {
        Self {
            call_id,
            outcome: Outcome::Failed {
                message: message.into(),
            },
            started_at,
            finished_at: Timestamp::now(),
        }
    }

    /// Execution duration in milliseconds
    #[must_use]
    pub fn execution_millis(&self) -> u128 {
        self.finished_at.millis_since(&self.started_at)
    }

    /// Encode to a JSON string
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails
    pub fn to_json(&self) -> CallResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from a JSON string
    ///
    /// # Errors
    ///
    /// Returns error if the body is not a valid response envelope
    pub fn from_json(body: &str) -> CallResult<Self> {
        Ok(serde_json::from_str(body)?)
    }
}

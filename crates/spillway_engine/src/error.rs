//! Engine error types.
//!
//! These are engine-internal; callers awaiting a call handle only ever
//! observe `spillway_core::CallError`.

use spillway_core::CallId;
use spillway_transport::TransportError;

/// Engine errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A transport operation failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A call was registered under a CallId already in the pending table
    #[error("Duplicate CallId: {0}")]
    DuplicateCallId(CallId),

    /// The engine is not in a state that allows the operation
    #[error("Engine not polling")]
    NotPolling,
}

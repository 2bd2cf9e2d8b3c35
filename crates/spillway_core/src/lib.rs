//! SPILLWAY Core
//!
//! Shared types for the queue-based RPC core: call identifiers,
//! request/response envelopes, outcome variants, and errors.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod envelope;
pub mod error;
pub mod id;
pub mod time;

pub use envelope::{CallRequest, CallResponse, Outcome};
pub use error::{CallError, CallResult};
pub use id::CallId;
pub use time::Timestamp;

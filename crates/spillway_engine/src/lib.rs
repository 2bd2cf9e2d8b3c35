//! SPILLWAY Engine
//!
//! Queue-based RPC correlation: turns a one-shot publish plus a shared,
//! continuously polled response queue into independent, individually
//! resolvable call futures, with graceful draining and duplicate/unknown
//! message handling.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod pending;

pub use engine::{CallHandle, CorrelationEngine, EngineConfig, EngineState};
pub use error::EngineError;
pub use pending::{PendingCall, PendingTable};

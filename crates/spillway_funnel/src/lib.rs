//! SPILLWAY Funnel
//!
//! Admission-controlled execution wrapper: concurrency limiting, token
//! bucket rate limiting, retry with backoff, and optional memoization with
//! an injectable persistent store. Used standalone to bound load against
//! any downstream operation, or placed in front of the correlation engine's
//! publish path.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod funnel;
pub mod gate;
pub mod memo;
pub mod rate;
pub mod retry;

pub use funnel::{Funnel, FunnelConfig};
pub use gate::{AdmissionPermit, ConcurrencyGate};
pub use memo::{canonical_key, FileStore, MemoCache, MemoStore, MemoryStore};
pub use rate::TokenBucket;
pub use retry::RetryPolicy;

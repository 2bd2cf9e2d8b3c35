//! SPILLWAY Invoker
//!
//! The call-site facade: one `call(function, args)` API dispatching either
//! directly to a local executor or through the queue-based correlation
//! engine, with the admission funnel (concurrency, rate, retry,
//! memoization) wrapped around whichever path is configured.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod invoker;

pub use invoker::{DirectInvoker, InvocationMode, Invoker, InvokerConfig};

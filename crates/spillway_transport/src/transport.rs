//! The transport capability consumed by the correlation engine.

use crate::error::TransportError;
use crate::message::{MessageReceipt, QueueMessage};
use async_trait::async_trait;
use spillway_core::CallRequest;

/// Minimal messaging capability a backend must implement
///
/// This is the only seam between the correlation core and a concrete
/// backend. The core never sees backend addressing, authentication, or
/// resource identifiers beyond the opaque locators inside the envelopes.
///
/// Delivery through `poll` is at-least-once and unordered; the engine
/// tolerates duplicates and redelivery by idempotent table lookup, not by
/// transactional acknowledgement.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a call request toward the execution side
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the publish; may fail
    /// transiently.
    async fn publish(&self, request: &CallRequest) -> Result<(), TransportError>;

    /// Send a control sentinel to the response destination
    ///
    /// Used to unblock a blocking `poll` during drain.
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the publish
    async fn publish_control(&self, tag: &str) -> Result<(), TransportError>;

    /// Retrieve zero or more pending messages from the response queue
    ///
    /// May block for a bounded interval (long-poll) when the queue is empty.
    /// Must be safely callable repeatedly; an empty result is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the backend poll fails
    async fn poll(&self) -> Result<Vec<QueueMessage>, TransportError>;

    /// Remove a delivered message from the queue so it is not redelivered
    ///
    /// # Errors
    ///
    /// Returns error if the acknowledgement fails
    async fn acknowledge(&self, receipt: &MessageReceipt) -> Result<(), TransportError>;

    /// Route an unroutable or unmatched message to a non-retriable sink
    ///
    /// Dead-lettering makes duplicate and late delivery observable instead
    /// of silently dropping messages or redelivering them forever.
    ///
    /// # Errors
    ///
    /// Returns error if the dead-letter routing fails
    async fn dead_letter(&self, message: &QueueMessage) -> Result<(), TransportError>;
}

//! In-memory channel transport.
//!
//! Backs the correlation engine with plain in-process queues: a request
//! queue consumed by a local executor task and a response queue the engine
//! polls. Supports duplicate delivery and failure injection so engine edge
//! cases are testable without a real backend.

use crate::error::TransportError;
use crate::message::{MessageReceipt, QueueMessage};
use crate::transport::Transport;
use async_trait::async_trait;
use spillway_core::{CallRequest, CallResponse};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

/// In-memory transport backed by process-local queues
pub struct ChannelTransport {
    requests: Mutex<VecDeque<CallRequest>>,
    responses: Mutex<VecDeque<QueueMessage>>,
    dead: Mutex<Vec<QueueMessage>>,
    acked: Mutex<Vec<MessageReceipt>>,
    request_notify: Notify,
    response_notify: Notify,
    closed: AtomicBool,
    fail_next_publish: AtomicBool,
    fail_next_control: AtomicBool,
    fail_next_poll: AtomicBool,
    next_receipt: AtomicU64,
    poll_wait: Duration,
}

impl ChannelTransport {
    /// Create a new channel transport
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(VecDeque::new()),
            responses: Mutex::new(VecDeque::new()),
            dead: Mutex::new(Vec::new()),
            acked: Mutex::new(Vec::new()),
            request_notify: Notify::new(),
            response_notify: Notify::new(),
            closed: AtomicBool::new(false),
            fail_next_publish: AtomicBool::new(false),
            fail_next_control: AtomicBool::new(false),
            fail_next_poll: AtomicBool::new(false),
            next_receipt: AtomicU64::new(0),
            poll_wait: Duration::from_millis(50),
        }
    }

    /// Set the bounded long-poll wait used when the response queue is empty
    #[must_use]
    pub fn with_poll_wait(mut self, wait: Duration) -> Self {
        self.poll_wait = wait;
        self
    }

    /// Take the next published request, waiting until one is available
    ///
    /// This is the executor side of the transport: whatever consumes
    /// requests and produces responses calls this in a loop.
    pub async fn next_request(&self) -> Option<CallRequest> {
        loop {
            if let Some(request) = self.requests.lock().await.pop_front() {
                return Some(request);
            }
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            self.request_notify.notified().await;
        }
    }

    /// Take the next published request without waiting
    pub async fn try_take_request(&self) -> Option<CallRequest> {
        self.requests.lock().await.pop_front()
    }

    /// Deliver a raw message to the response queue
    ///
    /// Delivering the same message twice simulates duplicate delivery.
    pub async fn deliver(&self, message: QueueMessage) {
        self.responses.lock().await.push_back(message);
        self.response_notify.notify_waiters();
    }

    /// Encode a response envelope and deliver it to the response queue
    ///
    /// # Errors
    ///
    /// Returns error if the envelope cannot be encoded
    pub async fn respond(&self, response: &CallResponse) -> Result<(), TransportError> {
        let body = response
            .to_json()
            .map_err(|e| TransportError::PublishFailed {
                reason: e.to_string(),
            })?;
        let receipt = MessageReceipt::new(
            self.next_receipt
                .fetch_add(1, Ordering::SeqCst)
                .to_string(),
        );
        self.deliver(QueueMessage::payload(body, receipt)).await;
        Ok(())
    }

    /// Get all dead-lettered messages
    pub async fn dead_letters(&self) -> Vec<QueueMessage> {
        self.dead.lock().await.clone()
    }

    /// Get all acknowledged receipts
    pub async fn acknowledged(&self) -> Vec<MessageReceipt> {
        self.acked.lock().await.clone()
    }

    /// Fail the next publish with a transient error
    pub fn fail_next_publish(&self) {
        self.fail_next_publish.store(true, Ordering::SeqCst);
    }

    /// Fail the next control publish with a transient error
    pub fn fail_next_control(&self) {
        self.fail_next_control.store(true, Ordering::SeqCst);
    }

    /// Fail the next poll with a transient error
    pub fn fail_next_poll(&self) {
        self.fail_next_poll.store(true, Ordering::SeqCst);
    }

    /// Close the transport; subsequent publishes fail
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.request_notify.notify_waiters();
        self.response_notify.notify_waiters();
    }

    async fn drain_responses(&self) -> Vec<QueueMessage> {
        let mut queue = self.responses.lock().await;
        queue.drain(..).collect()
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn publish(&self, request: &CallRequest) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.fail_next_publish.swap(false, Ordering::SeqCst) {
            return Err(TransportError::PublishFailed {
                reason: "injected publish failure".to_string(),
            });
        }
        self.requests.lock().await.push_back(request.clone());
        self.request_notify.notify_waiters();
        Ok(())
    }

    async fn publish_control(&self, tag: &str) -> Result<(), TransportError> {
        if self.fail_next_control.swap(false, Ordering::SeqCst) {
            return Err(TransportError::PublishFailed {
                reason: "injected control publish failure".to_string(),
            });
        }
        self.deliver(QueueMessage::control(tag)).await;
        Ok(())
    }

    async fn poll(&self) -> Result<Vec<QueueMessage>, TransportError> {
        if self.fail_next_poll.swap(false, Ordering::SeqCst) {
            return Err(TransportError::PollFailed {
                reason: "injected poll failure".to_string(),
            });
        }

        let batch = self.drain_responses().await;
        if !batch.is_empty() {
            return Ok(batch);
        }

        // Bounded long-poll: wait for a delivery or give up after poll_wait.
        let _ = tokio::time::timeout(self.poll_wait, self.response_notify.notified()).await;
        Ok(self.drain_responses().await)
    }

    async fn acknowledge(&self, receipt: &MessageReceipt) -> Result<(), TransportError> {
        self.acked.lock().await.push(receipt.clone());
        Ok(())
    }

    async fn dead_letter(&self, message: &QueueMessage) -> Result<(), TransportError> {
        tracing::debug!(receipt = %message.receipt, "message dead-lettered");
        self.dead.lock().await.push(message.clone());
        Ok(())
    }
}

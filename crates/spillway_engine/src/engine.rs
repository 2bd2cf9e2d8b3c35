//! The correlation engine.
//!
//! Owns the pending-call table, the background poll loop, and the drain
//! protocol. Built entirely on the transport capability; independent of
//! any concrete backend.
//!
//! One logical consumer per engine instance polls the shared response
//! queue and settles the matching caller future per message. Unmatched,
//! duplicate, and malformed messages are dead-lettered; transient poll
//! failures back off and retry; only an explicit [`CorrelationEngine::stop`]
//! terminates the loop.

use crate::error::EngineError;
use crate::pending::{PendingCall, PendingTable};
use serde_json::Value;
use spillway_core::{CallError, CallId, CallRequest, CallResponse, CallResult};
use spillway_transport::{CONTROL_STOP, QueueMessage, Transport};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, oneshot};
use tokio::task::JoinHandle;

/// Initial backoff after a failed poll
const POLL_BACKOFF_BASE: Duration = Duration::from_millis(100);
/// Backoff cap for repeated poll failures
const POLL_BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Correlation engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Locator of the response queue, stamped onto outgoing requests
    pub response_destination: String,
}

impl EngineConfig {
    /// Create a config for the given response destination
    #[must_use]
    pub fn new(response_destination: impl Into<String>) -> Self {
        Self {
            response_destination: response_destination.into(),
        }
    }
}

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No poll loop running
    Idle,
    /// Poll loop active
    Polling,
    /// Stop requested, loop finishing its current batch
    Draining,
    /// Loop exited, table cleared
    Stopped,
}

/// Future resolving to the outcome of one enqueued call
///
/// Settles exactly once: with the remote value, the remote failure, a
/// publish failure, or a drain cancellation. There is no intrinsic
/// per-call timeout - an unmatched CallId waits until drain. A caller
/// needing a deadline races the handle externally:
///
/// ```ignore
/// let value = tokio::time::timeout(deadline, handle).await;
/// ```
#[derive(Debug)]
pub struct CallHandle {
    call_id: CallId,
    receiver: oneshot::Receiver<CallResult<Value>>,
}

impl CallHandle {
    /// The CallId this handle resolves
    #[must_use]
    pub const fn call_id(&self) -> CallId {
        self.call_id
    }
}

impl Future for CallHandle {
    type Output = CallResult<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(CallError::Internal {
                message: "pending call dropped before settlement".to_string(),
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Queue-based RPC correlation engine
///
/// Turns a one-shot publish plus a shared polled response queue into
/// independent call futures keyed by CallId.
pub struct CorrelationEngine<T> {
    transport: Arc<T>,
    config: EngineConfig,
    pending: Arc<PendingTable>,
    state: Arc<Mutex<EngineState>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    stopped: Arc<Notify>,
}

impl<T: Transport + 'static> CorrelationEngine<T> {
    /// Create an engine over the given transport
    #[must_use]
    pub fn new(transport: Arc<T>, config: EngineConfig) -> Self {
        Self {
            transport,
            config,
            pending: Arc::new(PendingTable::new()),
            state: Arc::new(Mutex::new(EngineState::Idle)),
            loop_handle: Mutex::new(None),
            stopped: Arc::new(Notify::new()),
        }
    }

    /// The configured response destination
    #[must_use]
    pub fn response_destination(&self) -> &str {
        &self.config.response_destination
    }

    /// Current lifecycle state
    pub async fn state(&self) -> EngineState {
        *self.state.lock().await
    }

    /// Number of calls awaiting a response
    pub async fn pending_count(&self) -> usize {
        self.pending.len().await
    }

    /// Register and publish a call, returning its settlement handle
    ///
    /// The pending entry is registered *before* the publish so a response
    /// arriving immediately after the publish always finds it. On publish
    /// failure the entry is removed and the handle settles with
    /// [`CallError::Publish`]. The first call starts the poll loop. Once
    /// the engine is draining or stopped the handle settles immediately
    /// with [`CallError::EngineStopped`].
    pub async fn enqueue_call(&self, request: CallRequest) -> CallHandle {
        let call_id = request.call_id;
        let (tx, rx) = oneshot::channel();
        let handle = CallHandle {
            call_id,
            receiver: rx,
        };

        {
            let mut state = self.state.lock().await;
            match *state {
                EngineState::Draining | EngineState::Stopped => {
                    let _ = tx.send(Err(CallError::EngineStopped));
                    return handle;
                }
                EngineState::Idle => {
                    *state = EngineState::Polling;
                    self.spawn_poll_loop().await;
                }
                EngineState::Polling => {}
            }
        }

        if let Err(err) = self.pending.insert(call_id, PendingCall::new(tx)).await {
            // CallIds are never reused; a duplicate is a caller bug. The
            // dropped sender settles the handle as orphaned.
            tracing::warn!(%call_id, error = %err, "rejected duplicate call registration");
            return handle;
        }

        if let Err(err) = self.transport.publish(&request).await {
            if let Some(pending) = self.pending.remove(&call_id).await {
                pending.settle(Err(CallError::Publish {
                    reason: err.to_string(),
                }));
            }
            return handle;
        }

        // A drain can complete between the admission check above and the
        // table insert; such an entry would never be settled. Re-check and
        // cancel it so no call outlives a returned stop().
        let state = *self.state.lock().await;
        if matches!(state, EngineState::Draining | EngineState::Stopped) {
            if let Some(pending) = self.pending.remove(&call_id).await {
                pending.settle(Err(CallError::Cancelled));
            }
        }

        handle
    }

    /// Drain the engine: cancel outstanding calls and stop the poll loop
    ///
    /// Publishes a stop control message to unblock a blocking poll, then
    /// waits for the loop to exit. Every still-pending call settles with
    /// [`CallError::Cancelled`]. Returns only once no background activity
    /// remains. Idempotent: stopping a stopped engine is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if this call initiated the drain and the stop control
    /// message could not be published; the engine then resumes polling. A
    /// concurrent `stop` that observes the rollback re-initiates the drain
    /// itself.
    pub async fn stop(&self) -> Result<(), EngineError> {
        loop {
            let initiated = {
                let mut state = self.state.lock().await;
                match *state {
                    EngineState::Stopped => return Ok(()),
                    EngineState::Idle => {
                        *state = EngineState::Stopped;
                        return Ok(());
                    }
                    EngineState::Polling => {
                        *state = EngineState::Draining;
                        true
                    }
                    EngineState::Draining => false,
                }
            };

            if initiated {
                // Only the stop that performed the Polling -> Draining
                // transition publishes the control message and may roll
                // the transition back.
                if let Err(err) = self.transport.publish_control(CONTROL_STOP).await {
                    {
                        let mut state = self.state.lock().await;
                        if *state == EngineState::Draining {
                            *state = EngineState::Polling;
                        }
                    }
                    // Wake concurrent stops so they re-evaluate.
                    self.stopped.notify_waiters();
                    return Err(EngineError::Transport(err));
                }
                let handle = self.loop_handle.lock().await.take();
                if let Some(handle) = handle {
                    // Loop settles the remaining calls and transitions to
                    // Stopped before it returns.
                    let _ = handle.await;
                }
                return Ok(());
            }

            // Another stop owns the drain. Register for wakeups before
            // re-reading the state so a notification landing between the
            // check and the await is not lost.
            let notified = self.stopped.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let state = *self.state.lock().await;
            match state {
                EngineState::Stopped => return Ok(()),
                EngineState::Draining => notified.await,
                // Rolled back by a failed control publish; re-evaluate.
                _ => {}
            }
        }
    }

    async fn spawn_poll_loop(&self) {
        let task = poll_loop(
            self.transport.clone(),
            self.pending.clone(),
            self.state.clone(),
            self.stopped.clone(),
        );
        *self.loop_handle.lock().await = Some(tokio::spawn(task));
    }
}

/// The single logical consumer of the response queue
async fn poll_loop<T: Transport>(
    transport: Arc<T>,
    pending: Arc<PendingTable>,
    state: Arc<Mutex<EngineState>>,
    stopped: Arc<Notify>,
) {
    let mut backoff = POLL_BACKOFF_BASE;

    'poll: loop {
        let batch = match transport.poll().await {
            Ok(batch) => {
                backoff = POLL_BACKOFF_BASE;
                batch
            }
            Err(err) => {
                // A poll failure is not a CallId-scoped event; back off
                // and keep polling rather than terminating the engine.
                tracing::warn!(error = %err, "response poll failed, backing off");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(POLL_BACKOFF_MAX);
                continue;
            }
        };

        let mut drain_requested = false;
        for message in batch {
            if message.is_control(CONTROL_STOP) {
                drain_requested = true;
                let _ = transport.acknowledge(&message.receipt).await;
                continue;
            }
            handle_message(transport.as_ref(), pending.as_ref(), message).await;
        }

        // The loop never exits on an empty table - new calls may still
        // arrive. Only an observed stop control ends it, after the
        // current batch is finished.
        if drain_requested {
            break 'poll;
        }
    }

    let drained = pending.drain_all().await;
    if !drained.is_empty() {
        tracing::debug!(count = drained.len(), "cancelling outstanding calls at drain");
    }
    for (_, call) in drained {
        call.settle(Err(CallError::Cancelled));
    }

    *state.lock().await = EngineState::Stopped;
    stopped.notify_waiters();
}

/// Correlate one delivered message, acknowledging or dead-lettering it
async fn handle_message<T: Transport>(transport: &T, pending: &PendingTable, message: QueueMessage) {
    match CallResponse::from_json(&message.body) {
        Ok(response) => match pending.remove(&response.call_id).await {
            Some(call) => {
                call.settle(response.outcome.into_result());
                if let Err(err) = transport.acknowledge(&message.receipt).await {
                    tracing::warn!(error = %err, "acknowledge failed after settlement");
                }
            }
            None => {
                // Already settled, expired, or never ours: dead-letter so
                // duplicate and late delivery stay observable.
                tracing::debug!(call_id = %response.call_id, "unmatched response, dead-lettering");
                if let Err(err) = transport.dead_letter(&message).await {
                    tracing::warn!(error = %err, "dead-letter failed");
                }
            }
        },
        Err(_) => {
            tracing::debug!("malformed response body, dead-lettering");
            if let Err(err) = transport.dead_letter(&message).await {
                tracing::warn!(error = %err, "dead-letter failed");
            }
        }
    }
}

//! The pending-call table.
//!
//! One entry per in-flight CallId, from registration (before publish)
//! until settlement. Many callers insert; exactly one poll loop removes.
//! A CallId leaves the table exactly once, by whichever event settles it
//! first - response match, publish failure, or drain.

use crate::error::EngineError;
use serde_json::Value;
use spillway_core::{CallId, CallResult, Timestamp};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::sync::oneshot;

/// A registered call awaiting its response
#[derive(Debug)]
pub struct PendingCall {
    /// Settles the caller's handle; consumed exactly once
    pub sender: oneshot::Sender<CallResult<Value>>,
    /// When the call was registered
    pub registered_at: Timestamp,
}

impl PendingCall {
    /// Create a pending call around a oneshot sender
    #[must_use]
    pub fn new(sender: oneshot::Sender<CallResult<Value>>) -> Self {
        Self {
            sender,
            registered_at: Timestamp::now(),
        }
    }

    /// Settle the caller's handle with the given result
    ///
    /// Settling after the caller dropped its handle is a no-op.
    pub fn settle(self, result: CallResult<Value>) {
        let _ = self.sender.send(result);
    }
}

/// Table of pending calls keyed by CallId
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<CallId, PendingCall>>,
}

impl PendingTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending call
    ///
    /// # Errors
    ///
    /// Returns error if the CallId already has a pending entry; CallIds
    /// are never reused, so a duplicate is a caller bug.
    pub async fn insert(&self, call_id: CallId, call: PendingCall) -> Result<(), EngineError> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&call_id) {
            return Err(EngineError::DuplicateCallId(call_id));
        }
        entries.insert(call_id, call);
        Ok(())
    }

    /// Remove and return the pending call for a CallId
    ///
    /// Returns `None` if the CallId was never registered or already
    /// settled - the idempotent lookup that makes duplicate delivery safe.
    pub async fn remove(&self, call_id: &CallId) -> Option<PendingCall> {
        self.entries.lock().await.remove(call_id)
    }

    /// Remove every pending call, leaving the table empty
    pub async fn drain_all(&self) -> Vec<(CallId, PendingCall)> {
        self.entries.lock().await.drain().collect()
    }

    /// Number of pending calls
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the table is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_pending() -> (PendingCall, oneshot::Receiver<CallResult<Value>>) {
        let (tx, rx) = oneshot::channel();
        (PendingCall::new(tx), rx)
    }

    #[tokio::test]
    async fn test_insert_and_remove() {
        let table = PendingTable::new();
        let call_id = CallId::new();
        let (pending, mut rx) = make_pending();

        table.insert(call_id, pending).await.unwrap();
        assert_eq!(table.len().await, 1);

        let removed = table.remove(&call_id).await.unwrap();
        assert!(table.is_empty().await);

        removed.settle(Ok(json!(1)));
        assert_eq!(rx.try_recv().unwrap().unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_remove_is_exactly_once() {
        let table = PendingTable::new();
        let call_id = CallId::new();
        let (pending, _rx) = make_pending();

        table.insert(call_id, pending).await.unwrap();
        assert!(table.remove(&call_id).await.is_some());
        assert!(table.remove(&call_id).await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let table = PendingTable::new();
        let call_id = CallId::new();
        let (first, _rx1) = make_pending();
        let (second, _rx2) = make_pending();

        table.insert(call_id, first).await.unwrap();
        let err = table.insert(call_id, second).await.unwrap_err();
        assert_eq!(err, EngineError::DuplicateCallId(call_id));
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_drain_all_clears_table() {
        let table = PendingTable::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (pending, rx) = make_pending();
            table.insert(CallId::new(), pending).await.unwrap();
            receivers.push(rx);
        }

        let drained = table.drain_all().await;
        assert_eq!(drained.len(), 3);
        assert!(table.is_empty().await);

        for (_, pending) in drained {
            pending.settle(Err(spillway_core::CallError::Cancelled));
        }
        for mut rx in receivers {
            assert_eq!(
                rx.try_recv().unwrap().unwrap_err(),
                spillway_core::CallError::Cancelled
            );
        }
    }

    #[tokio::test]
    async fn test_settle_after_handle_dropped_is_noop() {
        let (pending, rx) = make_pending();
        drop(rx);
        // Must not panic
        pending.settle(Ok(json!(null)));
    }
}

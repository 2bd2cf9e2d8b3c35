//! Concurrency gate - bounded simultaneous executions.
//!
//! A counting admission slot with FIFO ordering among waiters. No limit
//! means unbounded concurrency and no waiting.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Concurrency gate limiting simultaneous executions
///
/// Admission is first-come-first-served among waiters; completion order is
/// not constrained.
#[derive(Clone)]
pub struct ConcurrencyGate {
    semaphore: Option<Arc<Semaphore>>,
    limit: Option<usize>,
}

impl ConcurrencyGate {
    /// Create a gate with the given slot limit; `None` is unbounded
    #[must_use]
    pub fn new(limit: Option<usize>) -> Self {
        let limit = limit.map(|n| n.max(1));
        Self {
            semaphore: limit.map(|n| Arc::new(Semaphore::new(n))),
            limit,
        }
    }

    /// Create an unbounded gate
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Get the slot limit
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Number of free slots, or `None` if unbounded
    #[must_use]
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }

    /// Acquire an admission slot, waiting in FIFO order if all are in use
    ///
    /// The slot is released when the returned permit is dropped. An
    /// unbounded gate admits immediately. The wait is indefinite; the gate
    /// never fails a caller due to contention.
    pub async fn acquire(&self) -> AdmissionPermit {
        match &self.semaphore {
            Some(semaphore) => {
                // The semaphore is never closed, so acquisition only fails
                // if the gate itself is dropped, which cannot happen while
                // `self` is borrowed.
                match semaphore.clone().acquire_owned().await {
                    Ok(permit) => AdmissionPermit {
                        _permit: Some(permit),
                    },
                    Err(_) => AdmissionPermit { _permit: None },
                }
            }
            None => AdmissionPermit { _permit: None },
        }
    }
}

/// An admission slot held for the duration of one execution
///
/// Dropping the permit frees the slot for the next waiter.
pub struct AdmissionPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

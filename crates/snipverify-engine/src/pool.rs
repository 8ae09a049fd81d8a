//! Bounded worker pool
//!
//! Caps how many sandboxes exist at once:
//! - A slot is held from provisioning until teardown finishes
//! - Waiters queue in FIFO order up to a queuing timeout
//! - Slots are released on drop, on every exit path

use crate::cancel::CancelToken;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Why a slot was not granted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    /// No slot freed up within the queuing timeout
    #[error("worker pool saturated: {capacity} slots busy for {waited:?}")]
    Saturated { capacity: usize, waited: Duration },

    /// Caller cancelled while queued
    #[error("cancelled while waiting for a worker slot")]
    Cancelled,

    /// Pool was shut down
    #[error("worker pool closed")]
    Closed,
}

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Maximum concurrent slots
    pub capacity: usize,
    /// Slots currently held
    pub in_use: usize,
    /// Slots free right now
    pub available: usize,
}

/// A held worker slot; released when dropped
#[derive(Debug)]
pub struct WorkerSlot {
    _permit: OwnedSemaphorePermit,
}

/// Fixed-capacity pool of sandbox slots
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    /// Create pool with `capacity` slots
    #[inline]
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a slot
    ///
    /// # Errors
    /// - `AcquireError::Saturated` if `queue_timeout` elapses first
    /// - `AcquireError::Cancelled` if `cancel` fires first
    /// - `AcquireError::Closed` after [`close`](Self::close)
    pub async fn acquire(
        &self,
        queue_timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> Result<WorkerSlot, AcquireError> {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(AcquireError::Cancelled);
        }

        let wait = tokio::time::timeout(queue_timeout, self.semaphore.clone().acquire_owned());
        let granted = match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => return Err(AcquireError::Cancelled),
                granted = wait => granted,
            },
            None => wait.await,
        };

        match granted {
            Ok(Ok(permit)) => Ok(WorkerSlot { _permit: permit }),
            Ok(Err(_closed)) => Err(AcquireError::Closed),
            Err(_elapsed) => Err(AcquireError::Saturated {
                capacity: self.capacity,
                waited: queue_timeout,
            }),
        }
    }

    /// Take a slot only if one is free now
    #[must_use]
    pub fn try_acquire(&self) -> Option<WorkerSlot> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| WorkerSlot { _permit: permit })
    }

    /// Refuse all future acquisitions; held slots stay valid
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Get pool capacity
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get pool statistics
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let available = self.semaphore.available_permits();
        PoolStats {
            capacity: self.capacity,
            in_use: self.capacity.saturating_sub(available),
            available,
        }
    }
}

//! Global memory budget shared by all in-flight tasks.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};
use tokio::sync::Notify;

use crate::errors::MarketDataError;

#[derive(Debug, Default)]
struct BudgetState {
    in_use: u64,
    peak: u64,
}

/// Counter of declared task memory, capped at `capacity` bytes.
///
/// `acquire` waits until enough headroom exists; dropping the returned
/// [`MemoryPermit`] gives the bytes back and wakes every waiter.
#[derive(Debug)]
pub struct MemoryBudget {
    capacity: u64,
    state: Mutex<BudgetState>,
    released: Notify,
}

impl MemoryBudget {
    pub fn new(capacity: u64) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            state: Mutex::new(BudgetState::default()),
            released: Notify::new(),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, BudgetState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Memory budget mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes currently held by permits.
    pub fn in_use(&self) -> u64 {
        self.lock_state().in_use
    }

    /// Highest `in_use` observed since creation.
    pub fn peak(&self) -> u64 {
        self.lock_state().peak
    }

    fn try_take(&self, bytes: u64) -> bool {
        let mut state = self.lock_state();
        let fits = state
            .in_use
            .checked_add(bytes)
            .filter(|total| *total <= self.capacity);
        if let Some(total) = fits {
            state.in_use = total;
            state.peak = state.peak.max(state.in_use);
            true
        } else {
            false
        }
    }

    /// Take `bytes` without waiting.
    pub fn try_acquire(self: &Arc<Self>, bytes: u64) -> Option<MemoryPermit> {
        self.try_take(bytes).then(|| MemoryPermit {
            budget: Arc::clone(self),
            bytes,
        })
    }

    /// Wait until `bytes` fit in the budget.
    ///
    /// Requests larger than the whole budget can never be satisfied and fail
    /// immediately.
    pub async fn acquire(self: &Arc<Self>, bytes: u64) -> Result<MemoryPermit, MarketDataError> {
        if bytes > self.capacity {
            return Err(MarketDataError::MemoryEstimateExceedsBudget {
                requested: bytes,
                budget: self.capacity,
            });
        }

        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not lost.
            notified.as_mut().enable();

            if let Some(permit) = self.try_acquire(bytes) {
                return Ok(permit);
            }

            debug!(
                "Waiting for {} bytes of memory budget ({} of {} in use)",
                bytes,
                self.in_use(),
                self.capacity
            );
            notified.await;
        }
    }

    fn release(&self, bytes: u64) {
        {
            let mut state = self.lock_state();
            state.in_use = state.in_use.saturating_sub(bytes);
        }
        self.released.notify_waiters();
    }
}

/// Bytes held against a [`MemoryBudget`]; released on drop.
#[derive(Debug)]
pub struct MemoryPermit {
    budget: Arc<MemoryBudget>,
    bytes: u64,
}

impl MemoryPermit {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for MemoryPermit {
    fn drop(&mut self) {
        self.budget.release(self.bytes);
    }
}

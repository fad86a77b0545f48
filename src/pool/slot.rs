//! Pool slots.
//!
//! A slot is one pool position: at most one worker handle, a busy flag and
//! lease-start timestamp, and a bounded FIFO queue of jobs waiting for
//! that worker. Slot `index` is stable for the slot's lifetime regardless
//! of worker churn; the `generation` counter is bumped whenever the slot's
//! worker is replaced wholesale (lease-timeout eviction), so a stale
//! release cannot resurrect an evicted slot.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
// tokio's Instant honors a paused test clock; std's does not.
use tokio::time::Instant;

use crate::bridge::WorkerHandle;
use crate::error::Result;
use crate::lease::WorkerLease;

// ============================================================================
// Types
// ============================================================================

/// A queued job waiting for this slot's worker.
pub(crate) type LeaseWaiter = oneshot::Sender<Result<WorkerLease>>;

// ============================================================================
// Slot
// ============================================================================

/// One pool position.
pub(crate) struct Slot {
    /// Position in the pool, stable for the slot's lifetime.
    pub(crate) index: usize,
    /// Mutable slot state; lock is never held across an await point.
    pub(crate) state: Mutex<SlotState>,
}

impl Slot {
    /// Creates an empty slot at `index`.
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            state: Mutex::new(SlotState::new()),
        }
    }

    /// Returns the current queue length.
    pub(crate) fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }
}

// ============================================================================
// SlotState
// ============================================================================

/// Mutable state of a slot.
pub(crate) struct SlotState {
    /// Worker handle; absent until created, replaced wholesale on crash or
    /// eviction.
    pub(crate) worker: Option<Arc<dyn WorkerHandle>>,
    /// True while worker creation is in flight.
    pub(crate) creating: bool,
    /// True exactly while a job holds the lease.
    pub(crate) busy: bool,
    /// Present iff `busy`.
    pub(crate) lease_start: Option<Instant>,
    /// Jobs waiting for this slot, in arrival order.
    pub(crate) queue: VecDeque<LeaseWaiter>,
    /// Bumped on eviction; leases carry the generation they were granted
    /// under.
    pub(crate) generation: u64,
}

impl SlotState {
    fn new() -> Self {
        Self {
            worker: None,
            creating: false,
            busy: false,
            lease_start: None,
            queue: VecDeque::new(),
            generation: 0,
        }
    }

    /// Returns `true` when a job can be granted the worker right now.
    pub(crate) fn is_dispatchable(&self) -> bool {
        self.worker.is_some() && !self.busy && !self.creating
    }

    /// Marks the slot leased and stamps the lease start.
    pub(crate) fn begin_lease(&mut self) {
        self.busy = true;
        self.lease_start = Some(Instant::now());
    }

    /// Clears the lease state.
    pub(crate) fn end_lease(&mut self) {
        self.busy = false;
        self.lease_start = None;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_slot_is_empty() {
        let slot = Slot::new(2);
        assert_eq!(slot.index, 2);
        assert_eq!(slot.queue_len(), 0);

        let state = slot.state.lock();
        assert!(state.worker.is_none());
        assert!(!state.busy);
        assert!(state.lease_start.is_none());
        assert!(!state.is_dispatchable());
    }

    #[test]
    fn test_lease_stamping() {
        let slot = Slot::new(0);
        let mut state = slot.state.lock();

        state.begin_lease();
        assert!(state.busy);
        assert!(state.lease_start.is_some());

        state.end_lease();
        assert!(!state.busy);
        assert!(state.lease_start.is_none());
    }
}

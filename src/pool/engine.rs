//! Pool engine: slot assignment, queueing, and lease recovery.
//!
//! The engine owns an ordered, fixed-size collection of slots. Workers are
//! created lazily; jobs are granted an idle slot's worker immediately or
//! queued on the slot (FIFO) up to the configured depth, overflowing onto
//! the least-loaded slot before the backpressure cutoff rejects them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 PoolEngine                   │
//! │  ┌────────────────────────────────────────┐  │
//! │  │ slot 0: worker, busy, lease, queue ▣▣  │  │
//! │  │ slot 1: worker, busy, lease, queue ▣   │  │
//! │  │ slot 2: (creating)         queue ▣▣▣   │  │
//! │  └────────────────────────────────────────┘  │
//! │    selection policy      lease watchdog      │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The lease watchdog runs on a fixed period (`lease_timeout / 4`) and
//! evicts any slot held longer than `lease_timeout`: the stuck worker is
//! abandoned (no teardown is issued) and a replacement is created
//! immediately. The dropped job is not notified; it is expected to have
//! timed out on its own.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::bridge::{WorkerBridge, WorkerOptions};
use crate::dispatcher::PoolOptions;
use crate::error::{Error, Result};
use crate::lease::{PendingLease, ReleaseHandle, WorkerLease};

use super::selection::SelectionPolicy;
use super::slot::{LeaseWaiter, Slot, SlotState};

// ============================================================================
// PoolEngine
// ============================================================================

/// Worker-pool scheduler.
///
/// Thread-safe; shared as `Arc<PoolEngine>`. Slot locks are held only for
/// short synchronous sections, never across an await point.
pub struct PoolEngine {
    /// Ordered slots, fixed size.
    slots: Vec<Arc<Slot>>,
    /// Worker process factory.
    bridge: Arc<dyn WorkerBridge>,
    /// Picks the preferred slot for each new job.
    selection: Mutex<SelectionPolicy>,
    /// Per-slot budget: active lease plus queued waiters.
    queue_depth: usize,
    /// First port handed to a worker; subsequent workers get
    /// `base_port + created_count`.
    base_port: u16,
    /// A slot busy longer than this is presumed stuck.
    lease_timeout: Duration,
    /// Monotonic count of workers ever created; never reused.
    created_count: AtomicU32,
    /// Set once by shutdown.
    closed: AtomicBool,
}

// ============================================================================
// PoolEngine - Constructor
// ============================================================================

impl PoolEngine {
    /// Creates a pool and starts its lease watchdog.
    ///
    /// Must be called within a tokio runtime. Round-robin pools may
    /// pre-warm `options.warm_slots` workers eagerly.
    pub(crate) fn new(
        bridge: Arc<dyn WorkerBridge>,
        policy: SelectionPolicy,
        options: &PoolOptions,
    ) -> Arc<Self> {
        let slots = (0..options.size).map(|i| Arc::new(Slot::new(i))).collect();

        let pool = Arc::new(Self {
            slots,
            bridge,
            selection: Mutex::new(policy),
            queue_depth: options.queue_depth,
            base_port: options.base_port,
            lease_timeout: options.lease_timeout,
            created_count: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        });

        let watchdog = Arc::clone(&pool);
        tokio::spawn(async move {
            watchdog.watchdog_loop().await;
        });

        for index in 0..options.warm_slots.min(options.size) {
            pool.ensure_worker(index);
        }

        info!(
            size = options.size,
            queue_depth = options.queue_depth,
            base_port = options.base_port,
            "Pool started"
        );

        pool
    }
}

// ============================================================================
// PoolEngine - Public API
// ============================================================================

impl PoolEngine {
    /// Admits a job to the pool.
    ///
    /// Admission is synchronous: selection, lazy worker creation kickoff,
    /// and placement all happen before this returns. The returned
    /// [`PendingLease`] resolves once the job is granted a worker.
    ///
    /// # Errors
    ///
    /// - [`Error::Overload`] if every slot's queue is saturated: the
    ///   deliberate backpressure cutoff, never queued or retried
    /// - [`Error::PoolClosed`] after shutdown
    pub(crate) fn open(self: &Arc<Self>) -> Result<PendingLease> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::PoolClosed);
        }

        let index = self.selection.lock().next(self.slots.len());
        self.ensure_worker(index);

        let (tx, rx) = oneshot::channel();
        self.place(index, tx)?;

        Ok(PendingLease::new(Box::pin(async move {
            let lease = rx.await??;
            Ok(lease)
        })))
    }

    /// Returns the number of slots.
    #[inline]
    #[must_use]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns the total number of queued jobs across all slots.
    #[must_use]
    pub(crate) fn queued_total(&self) -> usize {
        self.slots.iter().map(|slot| slot.queue_len()).sum()
    }

    /// Returns how many workers have ever been created.
    #[inline]
    #[must_use]
    pub(crate) fn workers_created(&self) -> u32 {
        self.created_count.load(Ordering::SeqCst)
    }

    /// Shuts the pool down.
    ///
    /// Fails all queued waiters with [`Error::PoolClosed`] and tears down
    /// every worker the pool still holds.
    pub(crate) async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Pool shutting down");

        let mut workers = Vec::new();
        let mut waiters: Vec<LeaseWaiter> = Vec::new();

        for slot in &self.slots {
            let mut state = slot.state.lock();
            if let Some(worker) = state.worker.take() {
                workers.push(worker);
            }
            state.end_lease();
            waiters.extend(state.queue.drain(..));
        }

        for tx in waiters {
            let _ = tx.send(Err(Error::PoolClosed));
        }

        for worker in workers {
            worker.exit().await;
        }

        info!("Pool shutdown complete");
    }
}

// ============================================================================
// PoolEngine - Placement
// ============================================================================

impl PoolEngine {
    /// Places a waiter on its preferred slot, or overflows.
    fn place(self: &Arc<Self>, index: usize, tx: LeaseWaiter) -> Result<()> {
        let tx = {
            let slot = &self.slots[index];
            let mut state = slot.state.lock();

            match self.try_grant(&mut state, index, tx) {
                Ok(()) => return Ok(()),
                Err(tx) if Self::has_room(&state, self.queue_depth) => {
                    state.queue.push_back(tx);
                    return Ok(());
                }
                Err(tx) => tx,
            }
        };

        self.place_overflow(tx)
    }

    /// Places a waiter on the least-loaded slot that can still take it.
    ///
    /// The scan (the preferred slot was already found full) considers only
    /// slots that can be granted right now or still have queue room, and
    /// prefers immediately grantable slots on queue-length ties. If no
    /// slot qualifies, the submission is rejected with [`Error::Overload`].
    fn place_overflow(self: &Arc<Self>, tx: LeaseWaiter) -> Result<()> {
        let mut best: Option<(usize, (usize, usize))> = None;
        for (index, slot) in self.slots.iter().enumerate() {
            let state = slot.state.lock();
            let dispatchable = state.is_dispatchable();
            if !dispatchable && !Self::has_room(&state, self.queue_depth) {
                continue;
            }
            let key = (state.queue.len(), usize::from(!dispatchable));
            drop(state);

            if best.is_none_or(|(_, min)| key < min) {
                best = Some((index, key));
            }
        }

        // No slot lock is held here; the counts are a consistent-enough
        // snapshot for the rejection message.
        let Some((index, _)) = best else {
            return Err(Error::overload(self.queued_total(), self.slot_count()));
        };

        let slot = &self.slots[index];
        {
            let mut state = slot.state.lock();

            match self.try_grant(&mut state, index, tx) {
                Ok(()) => return Ok(()),
                Err(tx) if Self::has_room(&state, self.queue_depth) => {
                    state.queue.push_back(tx);
                }
                Err(_) => {
                    // The slot filled up between the scan and this lock.
                    drop(state);
                    return Err(Error::overload(self.queued_total(), self.slot_count()));
                }
            }
        }

        debug!(slot = index, "Job overflowed onto least-loaded slot");
        self.ensure_worker(index);
        Ok(())
    }

    /// A slot holds at most `queue_depth` jobs: the active lease (if any)
    /// plus queued waiters. While the worker is still being created the
    /// whole budget is queued, since the head of the queue becomes the
    /// active lease the moment the worker arrives.
    fn has_room(state: &SlotState, queue_depth: usize) -> bool {
        state.queue.len() + usize::from(state.busy) < queue_depth
    }

    /// Grants the slot's worker to `tx` if the slot is idle.
    ///
    /// Returns the waiter back when the slot cannot be granted right now.
    fn try_grant(
        self: &Arc<Self>,
        state: &mut SlotState,
        index: usize,
        tx: LeaseWaiter,
    ) -> std::result::Result<(), LeaseWaiter> {
        if !state.is_dispatchable() {
            return Err(tx);
        }
        let Some(worker) = state.worker.clone() else {
            return Err(tx);
        };

        state.begin_lease();
        let lease = WorkerLease::new(
            worker,
            ReleaseHandle::pooled(Arc::clone(self), index, state.generation),
        );

        if tx.send(Ok(lease)).is_err() {
            // Waiter vanished before the grant arrived.
            state.end_lease();
        }

        Ok(())
    }
}

// ============================================================================
// PoolEngine - Release & Queue Service
// ============================================================================

impl PoolEngine {
    /// Ends a lease and serves the slot's queue.
    ///
    /// A release carrying a stale generation (the slot was evicted while
    /// the job ran) is a no-op, so a late completion cannot resurrect an
    /// evicted slot's worker.
    pub(crate) fn release(self: &Arc<Self>, index: usize, generation: u64) {
        {
            let slot = &self.slots[index];
            let mut state = slot.state.lock();

            if state.generation != generation {
                debug!(slot = index, "Release for evicted slot ignored");
                return;
            }

            state.end_lease();
        }

        self.serve_next(index);
    }

    /// Serves the next queued job on a slot, FIFO.
    fn serve_next(self: &Arc<Self>, index: usize) {
        loop {
            let slot = &self.slots[index];
            let mut state = slot.state.lock();

            if state.busy || state.creating {
                return;
            }

            if state.worker.is_none() {
                // Worker lost to a crash; recreate lazily if jobs wait.
                let has_waiters = !state.queue.is_empty();
                drop(state);
                if has_waiters {
                    self.ensure_worker(index);
                }
                return;
            }

            let Some(tx) = state.queue.pop_front() else {
                return;
            };

            match self.try_grant(&mut state, index, tx) {
                Ok(()) if state.busy => return,
                // Waiter was gone; the grant was rolled back. Serve the
                // next one.
                _ => continue,
            }
        }
    }
}

// ============================================================================
// PoolEngine - Worker Creation & Crash Handling
// ============================================================================

impl PoolEngine {
    /// Begins asynchronous worker creation for a slot, if needed.
    ///
    /// Port allocation is monotonic: `base_port + created_count`. Ports are
    /// never reused within the process lifetime, so a slow previous
    /// teardown cannot collide with its replacement.
    pub(crate) fn ensure_worker(self: &Arc<Self>, index: usize) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        {
            let mut state = self.slots[index].state.lock();
            if state.worker.is_some() || state.creating {
                return;
            }
            state.creating = true;
        }

        let offset = self.created_count.fetch_add(1, Ordering::SeqCst);
        let port = self.base_port.wrapping_add(offset as u16);
        let pool = Arc::clone(self);

        tokio::spawn(async move {
            pool.create_worker(index, port).await;
        });
    }

    /// Creates a worker for `index` on `port` and serves the slot's queue.
    async fn create_worker(self: Arc<Self>, index: usize, port: u16) {
        debug!(slot = index, port, "Creating worker");

        match self.bridge.create(WorkerOptions::new(port)).await {
            Ok(worker) => {
                // Bound once for this worker's lifetime.
                let weak = Arc::downgrade(&self);
                worker.set_crash_handler(Box::new(move || {
                    if let Some(pool) = weak.upgrade() {
                        pool.handle_crash(index);
                    }
                }));

                let exit_now = {
                    let mut state = self.slots[index].state.lock();
                    state.creating = false;
                    if self.closed.load(Ordering::SeqCst) {
                        true
                    } else {
                        state.worker = Some(Arc::clone(&worker));
                        false
                    }
                };

                if exit_now {
                    worker.exit().await;
                    return;
                }

                info!(slot = index, port, "Worker ready");
                self.serve_next(index);
            }
            Err(e) => {
                warn!(slot = index, port, error = %e, "Worker creation failed");

                let waiters: Vec<LeaseWaiter> = {
                    let mut state = self.slots[index].state.lock();
                    state.creating = false;
                    state.queue.drain(..).collect()
                };

                for tx in waiters {
                    let _ = tx.send(Err(Error::worker_create(port, e.to_string())));
                }
            }
        }
    }

    /// Invalidates a slot's worker after a crash.
    ///
    /// The slot self-heals lazily on next access; no proactive replacement
    /// is started. An in-flight job leasing the slot is not notified and
    /// will hang until its own timeout.
    fn handle_crash(self: &Arc<Self>, index: usize) {
        warn!(slot = index, "Worker crashed; slot will recreate on next access");

        let mut state = self.slots[index].state.lock();
        state.worker = None;
    }
}

// ============================================================================
// PoolEngine - Lease Watchdog
// ============================================================================

impl PoolEngine {
    /// Background task evicting stuck leases.
    async fn watchdog_loop(self: Arc<Self>) {
        let period = (self.lease_timeout / 4).max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);

        debug!(period_ms = period.as_millis() as u64, "Lease watchdog started");

        loop {
            ticker.tick().await;
            if self.closed.load(Ordering::SeqCst) {
                break;
            }
            self.evict_expired();
        }

        debug!("Lease watchdog terminated");
    }

    /// Evicts every slot whose lease is older than `lease_timeout`.
    fn evict_expired(self: &Arc<Self>) {
        for slot in &self.slots {
            let evicted = {
                let mut state = slot.state.lock();
                match state.lease_start {
                    Some(start) if start.elapsed() > self.lease_timeout => {
                        state.generation += 1;
                        state.end_lease();
                        // Abandoned, not terminated: no exit is issued
                        // against a presumed-stuck process.
                        state.worker = None;
                        true
                    }
                    _ => false,
                }
            };

            if evicted {
                warn!(
                    slot = slot.index,
                    timeout_ms = self.lease_timeout.as_millis() as u64,
                    "Lease expired; replacing slot worker"
                );
                self.ensure_worker(slot.index);
            }
        }
    }
}

impl std::fmt::Debug for PoolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolEngine")
            .field("slots", &self.slots.len())
            .field("queue_depth", &self.queue_depth)
            .field("created", &self.workers_created())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Worker leases.
//!
//! A [`WorkerLease`] is the exclusive hold a job has on a worker between
//! dispatch and release. Leases are granted by a
//! [`Strategy`](crate::Strategy), either immediately or after queueing
//! and/or worker creation, which is why [`PendingLease`] sits between the
//! synchronous admission decision and the eventual grant.
//!
//! Releasing is idempotent: the first [`ReleaseHandle::release`] call
//! returns the slot to its pool and serves the slot's queue; later calls
//! are no-ops. A lease that is dropped without being released is reclaimed
//! by the pool's lease watchdog, never by `Drop`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::bridge::WorkerHandle;
use crate::error::Result;
use crate::pool::PoolEngine;

// ============================================================================
// PendingLease
// ============================================================================

/// A lease grant in flight.
///
/// Produced by a strategy's `open` after synchronous admission succeeded.
/// Resolves once a worker is available for the job: immediately for an idle
/// slot, after the queue drains for a busy one, after process spawn for
/// creation-on-demand strategies.
pub struct PendingLease {
    /// Future resolving to the granted lease.
    future: BoxFuture<'static, Result<WorkerLease>>,
}

impl PendingLease {
    /// Wraps a lease-producing future.
    pub(crate) fn new(future: BoxFuture<'static, Result<WorkerLease>>) -> Self {
        Self { future }
    }

    /// Waits for the lease to be granted.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerCreate`](crate::Error::WorkerCreate) if worker
    ///   creation failed while this job was queued
    /// - [`Error::PoolClosed`](crate::Error::PoolClosed) if the pool shut
    ///   down before the grant
    pub async fn wait(self) -> Result<WorkerLease> {
        self.future.await
    }
}

impl fmt::Debug for PendingLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingLease").finish_non_exhaustive()
    }
}

// ============================================================================
// WorkerLease
// ============================================================================

/// Exclusive use of one worker, granted to one job.
pub struct WorkerLease {
    /// The leased worker.
    worker: Arc<dyn WorkerHandle>,
    /// Release hook for this lease.
    release: ReleaseHandle,
}

impl WorkerLease {
    /// Creates a lease over `worker` with the given release hook.
    pub(crate) fn new(worker: Arc<dyn WorkerHandle>, release: ReleaseHandle) -> Self {
        Self { worker, release }
    }

    /// Returns the leased worker.
    #[inline]
    #[must_use]
    pub fn worker(&self) -> &Arc<dyn WorkerHandle> {
        &self.worker
    }

    /// Returns the release hook.
    #[inline]
    #[must_use]
    pub fn release_handle(&self) -> &ReleaseHandle {
        &self.release
    }

    /// Ends this job's exclusive use of the worker.
    ///
    /// Idempotent; see [`ReleaseHandle::release`].
    #[inline]
    pub fn release(&self) {
        self.release.release();
    }
}

impl fmt::Debug for WorkerLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerLease")
            .field("released", &self.release.is_released())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ReleaseHandle
// ============================================================================

/// What releasing a lease does, by strategy shape.
enum ReleaseKind {
    /// Return the slot to its pool; the pool serves the slot's queue.
    Pool {
        pool: Arc<PoolEngine>,
        slot: usize,
        /// Slot generation at grant time. A stale generation means the
        /// slot was evicted while this job ran; the release is then a
        /// no-op so the evicted slot cannot be resurrected.
        generation: u64,
    },
    /// Nothing to return; single-connection strategies manage their worker
    /// through `exit` and auto-close instead.
    None,
}

/// Idempotent release hook handed out with every lease.
#[derive(Clone)]
pub struct ReleaseHandle {
    inner: Arc<ReleaseInner>,
}

struct ReleaseInner {
    /// Set by the first `release` call.
    released: AtomicBool,
    kind: ReleaseKind,
}

impl ReleaseHandle {
    /// Creates a pooled release hook.
    pub(crate) fn pooled(pool: Arc<PoolEngine>, slot: usize, generation: u64) -> Self {
        Self {
            inner: Arc::new(ReleaseInner {
                released: AtomicBool::new(false),
                kind: ReleaseKind::Pool {
                    pool,
                    slot,
                    generation,
                },
            }),
        }
    }

    /// Creates a no-op release hook for non-pooled strategies.
    pub(crate) fn noop() -> Self {
        Self {
            inner: Arc::new(ReleaseInner {
                released: AtomicBool::new(false),
                kind: ReleaseKind::None,
            }),
        }
    }

    /// Returns `true` once the lease has been released.
    #[inline]
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Releases the lease.
    ///
    /// The first call clears the slot's busy state and serves the next
    /// queued job; every later call is a no-op, so double-release cannot
    /// double-serve the queue.
    pub fn release(&self) {
        if self.inner.released.swap(true, Ordering::SeqCst) {
            debug!("Duplicate lease release ignored");
            return;
        }

        if let ReleaseKind::Pool {
            pool,
            slot,
            generation,
        } = &self.inner.kind
        {
            pool.release(*slot, *generation);
        }
    }
}

impl fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseHandle")
            .field("released", &self.is_released())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Connection strategies.
//!
//! A strategy decides how jobs obtain workers. All variants share one
//! capability-set contract (`open`, `exit`, `supports_auto_close`) with
//! tagged dispatch over an internal enum rather than an inheritance chain.
//!
//! | Variant | Workers | Auto-close |
//! |---------|---------|------------|
//! | Always-new | fresh worker per job, fixed port | yes |
//! | Always-new, incrementing port | fresh worker per job, fresh port | yes |
//! | Recycle-one | one lazily-created worker reused until it crashes | no |
//! | Pooled | fixed slot pool with queueing and lease recovery | no |
//!
//! The incrementing-port variant exists because a slowly tearing-down
//! worker can still hold its port when the next one starts.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::bridge::{WorkerBridge, WorkerHandle, WorkerOptions};
use crate::error::Result;
use crate::lease::{PendingLease, ReleaseHandle, WorkerLease};
use crate::pool::PoolEngine;

// ============================================================================
// StrategyKind
// ============================================================================

/// Configuration-level selector for the strategy variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    /// Fresh worker per job on a fixed port.
    AlwaysNew,
    /// Fresh worker per job, each on a new port.
    AlwaysNewIncrementingPort,
    /// One worker, recycled until it crashes.
    RecycleOne,
    /// Slot pool with round-robin selection.
    #[default]
    RoundRobinPool,
    /// Slot pool with uniform-random selection.
    RandomPool,
}

impl StrategyKind {
    /// Returns `true` for the pooled variants.
    #[inline]
    #[must_use]
    pub fn is_pooled(&self) -> bool {
        matches!(self, Self::RoundRobinPool | Self::RandomPool)
    }
}

// ============================================================================
// Strategy
// ============================================================================

/// The active worker-acquisition strategy.
///
/// Jobs never touch pool internals; they go through
/// [`open`](Strategy::open) and the lease's release hook.
pub struct Strategy {
    inner: StrategyInner,
}

enum StrategyInner {
    AlwaysNew {
        bridge: Arc<dyn WorkerBridge>,
        port: u16,
        increment_port: bool,
        /// Ports handed out so far; only read when `increment_port`.
        created: AtomicU32,
        /// Most recently created worker, torn down by `exit`.
        last: Arc<Mutex<Option<Arc<dyn WorkerHandle>>>>,
    },
    RecycleOne {
        bridge: Arc<dyn WorkerBridge>,
        port: u16,
        /// The one cached worker; nulled by its crash handler.
        cached: Arc<Mutex<Option<Arc<dyn WorkerHandle>>>>,
        /// Serializes lazy creation so two opens cannot double-create.
        create_lock: Arc<tokio::sync::Mutex<()>>,
    },
    Pooled {
        pool: Arc<PoolEngine>,
    },
}

// ============================================================================
// Strategy - Constructors
// ============================================================================

impl Strategy {
    /// Always-new strategy: every open creates a brand-new worker on
    /// `port`.
    #[must_use]
    pub fn always_new(bridge: Arc<dyn WorkerBridge>, port: u16) -> Self {
        Self {
            inner: StrategyInner::AlwaysNew {
                bridge,
                port,
                increment_port: false,
                created: AtomicU32::new(0),
                last: Arc::new(Mutex::new(None)),
            },
        }
    }

    /// Always-new strategy with a fresh port per creation.
    #[must_use]
    pub fn always_new_incrementing_port(bridge: Arc<dyn WorkerBridge>, base_port: u16) -> Self {
        Self {
            inner: StrategyInner::AlwaysNew {
                bridge,
                port: base_port,
                increment_port: true,
                created: AtomicU32::new(0),
                last: Arc::new(Mutex::new(None)),
            },
        }
    }

    /// Recycle-one strategy: one lazily-created worker shared by every
    /// open until it crashes.
    #[must_use]
    pub fn recycle_one(bridge: Arc<dyn WorkerBridge>, port: u16) -> Self {
        Self {
            inner: StrategyInner::RecycleOne {
                bridge,
                port,
                cached: Arc::new(Mutex::new(None)),
                create_lock: Arc::new(tokio::sync::Mutex::new(())),
            },
        }
    }

    /// Pooled strategy over an existing pool engine.
    #[must_use]
    pub(crate) fn pooled(pool: Arc<PoolEngine>) -> Self {
        Self {
            inner: StrategyInner::Pooled { pool },
        }
    }
}

// ============================================================================
// Strategy - Contract
// ============================================================================

impl Strategy {
    /// Admits a job and returns its pending lease.
    ///
    /// Admission is synchronous; only the pooled variant can reject here
    /// (backpressure cutoff or closed pool).
    ///
    /// # Errors
    ///
    /// - [`Error::Overload`](crate::Error::Overload) if every pool slot's
    ///   queue is saturated
    /// - [`Error::PoolClosed`](crate::Error::PoolClosed) after shutdown
    pub fn open(&self) -> Result<PendingLease> {
        match &self.inner {
            StrategyInner::AlwaysNew {
                bridge,
                port,
                increment_port,
                created,
                last,
            } => {
                let port = if *increment_port {
                    port.wrapping_add(created.fetch_add(1, Ordering::SeqCst) as u16)
                } else {
                    *port
                };
                let bridge = Arc::clone(bridge);
                let last = Arc::clone(last);

                Ok(PendingLease::new(Box::pin(async move {
                    debug!(port, "Creating worker for always-new open");
                    let worker = bridge.create(WorkerOptions::new(port)).await?;
                    *last.lock() = Some(Arc::clone(&worker));
                    Ok(WorkerLease::new(worker, ReleaseHandle::noop()))
                })))
            }

            StrategyInner::RecycleOne {
                bridge,
                port,
                cached,
                create_lock,
            } => {
                let port = *port;
                let bridge = Arc::clone(bridge);
                let cached = Arc::clone(cached);
                let create_lock = Arc::clone(create_lock);

                Ok(PendingLease::new(Box::pin(async move {
                    let _guard = create_lock.lock().await;

                    if let Some(worker) = cached.lock().clone() {
                        return Ok(WorkerLease::new(worker, ReleaseHandle::noop()));
                    }

                    debug!(port, "Creating recycled worker");
                    let worker = bridge.create(WorkerOptions::new(port)).await?;

                    // Crash forces immediate teardown and clears the cache
                    // so the next open recreates.
                    let cache_ref = Arc::clone(&cached);
                    let crashed = Arc::clone(&worker);
                    worker.set_crash_handler(Box::new(move || {
                        warn!("Recycled worker crashed; dropping cached handle");
                        *cache_ref.lock() = None;
                        let dead = Arc::clone(&crashed);
                        tokio::spawn(async move { dead.exit().await });
                    }));

                    *cached.lock() = Some(Arc::clone(&worker));
                    Ok(WorkerLease::new(worker, ReleaseHandle::noop()))
                })))
            }

            StrategyInner::Pooled { pool } => pool.open(),
        }
    }

    /// Returns `true` if a job's `close_when_finished` request may
    /// terminate the worker outright.
    ///
    /// Only per-job worker strategies support this; recycled and pooled
    /// workers outlive individual jobs.
    #[inline]
    #[must_use]
    pub fn supports_auto_close(&self) -> bool {
        matches!(self.inner, StrategyInner::AlwaysNew { .. })
    }

    /// Tears down whatever the strategy currently holds.
    pub async fn exit(&self) {
        match &self.inner {
            StrategyInner::AlwaysNew { last, .. } => {
                let worker = last.lock().take();
                if let Some(worker) = worker {
                    worker.exit().await;
                }
            }
            StrategyInner::RecycleOne { cached, .. } => {
                let worker = cached.lock().take();
                if let Some(worker) = worker {
                    worker.exit().await;
                }
            }
            StrategyInner::Pooled { pool } => pool.shutdown().await,
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match &self.inner {
            StrategyInner::AlwaysNew {
                increment_port: false,
                ..
            } => "AlwaysNew",
            StrategyInner::AlwaysNew { .. } => "AlwaysNewIncrementingPort",
            StrategyInner::RecycleOne { .. } => "RecycleOne",
            StrategyInner::Pooled { .. } => "Pooled",
        };
        f.debug_struct("Strategy").field("variant", &name).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::MockBridge;

    #[tokio::test]
    async fn test_always_new_creates_per_open() {
        let bridge = MockBridge::shared();
        let strategy =
            Strategy::always_new(Arc::clone(&bridge) as Arc<dyn WorkerBridge>, 8910);

        let a = strategy.open().expect("open").wait().await.expect("lease");
        let b = strategy.open().expect("open").wait().await.expect("lease");
        assert!(!Arc::ptr_eq(a.worker(), b.worker()));

        assert_eq!(bridge.created_ports(), vec![8910, 8910]);
        assert!(strategy.supports_auto_close());
    }

    #[tokio::test]
    async fn test_incrementing_port_allocates_fresh_ports() {
        let bridge = MockBridge::shared();
        let strategy = Strategy::always_new_incrementing_port(
            Arc::clone(&bridge) as Arc<dyn WorkerBridge>,
            8910,
        );

        for _ in 0..3 {
            let _ = strategy.open().expect("open").wait().await.expect("lease");
        }

        assert_eq!(bridge.created_ports(), vec![8910, 8911, 8912]);
        assert!(strategy.supports_auto_close());
    }

    #[tokio::test]
    async fn test_recycle_one_reuses_worker() {
        let bridge = MockBridge::shared();
        let strategy =
            Strategy::recycle_one(Arc::clone(&bridge) as Arc<dyn WorkerBridge>, 8910);

        let a = strategy.open().expect("open").wait().await.expect("lease");
        let b = strategy.open().expect("open").wait().await.expect("lease");
        assert!(Arc::ptr_eq(a.worker(), b.worker()));

        assert_eq!(bridge.created_ports().len(), 1);
        assert!(!strategy.supports_auto_close());
    }

    #[tokio::test]
    async fn test_recycle_one_recreates_after_crash() {
        let bridge = MockBridge::shared();
        let strategy =
            Strategy::recycle_one(Arc::clone(&bridge) as Arc<dyn WorkerBridge>, 8910);

        let a = strategy.open().expect("open").wait().await.expect("lease");
        bridge.workers()[0].trigger_crash();
        tokio::task::yield_now().await;

        let b = strategy.open().expect("open").wait().await.expect("lease");
        assert!(!Arc::ptr_eq(a.worker(), b.worker()));
        assert_eq!(bridge.created_ports().len(), 2);

        // The crashed worker was torn down by the crash handler.
        assert!(bridge.workers()[0].exited());
    }

    #[tokio::test]
    async fn test_exit_tears_down_cached_worker() {
        let bridge = MockBridge::shared();
        let strategy =
            Strategy::recycle_one(Arc::clone(&bridge) as Arc<dyn WorkerBridge>, 8910);

        let _ = strategy.open().expect("open").wait().await.expect("lease");
        strategy.exit().await;

        assert!(bridge.workers()[0].exited());

        // The next open recreates.
        let _ = strategy.open().expect("open").wait().await.expect("lease");
        assert_eq!(bridge.created_ports().len(), 2);
    }

    #[test]
    fn test_strategy_kind_default_is_round_robin() {
        assert_eq!(StrategyKind::default(), StrategyKind::RoundRobinPool);
        assert!(StrategyKind::RoundRobinPool.is_pooled());
        assert!(StrategyKind::RandomPool.is_pooled());
        assert!(!StrategyKind::AlwaysNew.is_pooled());
    }
}

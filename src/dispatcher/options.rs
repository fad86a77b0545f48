//! Pool sizing and timing knobs.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_SIZE: usize = 4;
const DEFAULT_QUEUE_DEPTH: usize = 4;
const DEFAULT_BASE_PORT: u16 = 8910;
const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// PoolOptions
// ============================================================================

/// Configuration for a pooled dispatcher.
///
/// ```
/// use std::time::Duration;
/// use headless_pool::PoolOptions;
///
/// let options = PoolOptions::new()
///     .size(8)
///     .queue_depth(4)
///     .lease_timeout(Duration::from_secs(60));
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Number of worker slots.
    pub(crate) size: usize,
    /// Per-slot budget: active lease plus queued waiters.
    pub(crate) queue_depth: usize,
    /// First port handed to a worker; later workers count up from here.
    pub(crate) base_port: u16,
    /// How long a lease may be held before the watchdog evicts the slot.
    pub(crate) lease_timeout: Duration,
    /// Workers to create eagerly at construction. Zero creates lazily.
    pub(crate) warm_slots: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            size: DEFAULT_SIZE,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            base_port: DEFAULT_BASE_PORT,
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
            warm_slots: 0,
        }
    }
}

impl PoolOptions {
    /// Creates options with the defaults: 4 slots, depth 4, port 8910,
    /// 30 second lease timeout, no warm slots.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker slots.
    #[inline]
    #[must_use]
    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Sets the per-slot budget (active lease plus queued waiters).
    #[inline]
    #[must_use]
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Sets the first worker port.
    #[inline]
    #[must_use]
    pub fn base_port(mut self, port: u16) -> Self {
        self.base_port = port;
        self
    }

    /// Sets the lease timeout. The watchdog runs every quarter of this.
    #[inline]
    #[must_use]
    pub fn lease_timeout(mut self, timeout: Duration) -> Self {
        self.lease_timeout = timeout;
        self
    }

    /// Sets how many workers to create eagerly at construction.
    #[inline]
    #[must_use]
    pub fn warm_slots(mut self, count: usize) -> Self {
        self.warm_slots = count;
        self
    }

    /// Rejects degenerate configurations.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::config("pool size must be at least 1"));
        }
        if self.queue_depth == 0 {
            return Err(Error::config("queue depth must be at least 1"));
        }
        if self.lease_timeout.is_zero() {
            return Err(Error::config("lease timeout must be non-zero"));
        }
        if self.warm_slots > self.size {
            return Err(Error::config("warm slots cannot exceed pool size"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Error types for the headless pool.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use headless_pool::{Result, Error};
//!
//! fn example(dispatcher: &Dispatcher, job: Job) -> Result<()> {
//!     let handle = dispatcher.dispatch(job)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidJob`] |
//! | Admission | [`Error::Overload`], [`Error::PoolClosed`] |
//! | Worker | [`Error::WorkerCreate`] |
//! | Job | [`Error::NavigationFailed`], [`Error::ConditionTimeout`], [`Error::Page`] |
//! | External | [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when dispatcher or pool configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Malformed job descriptor.
    ///
    /// Rejected synchronously at build time, before any asynchronous work.
    #[error("Invalid job: {message}")]
    InvalidJob {
        /// Description of what is wrong with the descriptor.
        message: String,
    },

    // ========================================================================
    // Admission Errors
    // ========================================================================
    /// Every slot's queue is saturated.
    ///
    /// This is a deliberate backpressure cutoff: the submission is rejected
    /// outright, never queued or retried.
    #[error("Pool overloaded: {queued} jobs queued across {slots} slots")]
    Overload {
        /// Total queued jobs at the moment of rejection.
        queued: usize,
        /// Number of slots in the pool.
        slots: usize,
    },

    /// The pool or strategy has been shut down.
    ///
    /// Returned for submissions after shutdown and to waiters whose queue
    /// was drained during shutdown.
    #[error("Pool closed")]
    PoolClosed,

    // ========================================================================
    // Worker Errors
    // ========================================================================
    /// Worker process failed to start.
    #[error("Worker creation failed on port {port}: {message}")]
    WorkerCreate {
        /// Port the worker was assigned.
        port: u16,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Job Errors
    // ========================================================================
    /// Navigation returned a non-success status.
    ///
    /// Surfaced via the `Failed` event; the job finishes without running
    /// its action.
    #[error("Navigation failed: {url}")]
    NavigationFailed {
        /// URL the page failed to open.
        url: String,
    },

    /// Readiness condition unsatisfied within the bound.
    ///
    /// Surfaced via the `Timeout` event; the action is not run.
    #[error("Condition not satisfied after {timeout_ms}ms")]
    ConditionTimeout {
        /// Milliseconds waited before timing out.
        timeout_ms: u64,
    },

    /// Page-level error reported by the worker.
    #[error("Page error: {message}")]
    Page {
        /// Error message from the page context.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid job error.
    #[inline]
    pub fn invalid_job(message: impl Into<String>) -> Self {
        Self::InvalidJob {
            message: message.into(),
        }
    }

    /// Creates an overload error.
    #[inline]
    pub fn overload(queued: usize, slots: usize) -> Self {
        Self::Overload { queued, slots }
    }

    /// Creates a worker creation error.
    #[inline]
    pub fn worker_create(port: u16, message: impl Into<String>) -> Self {
        Self::WorkerCreate {
            port,
            message: message.into(),
        }
    }

    /// Creates a navigation failure error.
    #[inline]
    pub fn navigation_failed(url: impl Into<String>) -> Self {
        Self::NavigationFailed { url: url.into() }
    }

    /// Creates a condition timeout error.
    #[inline]
    pub fn condition_timeout(timeout_ms: u64) -> Self {
        Self::ConditionTimeout { timeout_ms }
    }

    /// Creates a page error.
    #[inline]
    pub fn page(message: impl Into<String>) -> Self {
        Self::Page {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a backpressure rejection.
    #[inline]
    #[must_use]
    pub fn is_overload(&self) -> bool {
        matches!(self, Self::Overload { .. })
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConditionTimeout { .. })
    }

    /// Returns `true` if this is a worker-level error.
    #[inline]
    #[must_use]
    pub fn is_worker_error(&self) -> bool {
        matches!(self, Self::WorkerCreate { .. })
    }

    /// Returns `true` if the submission itself was rejected synchronously.
    ///
    /// Synchronous rejections never had a lease granted, so nothing needs
    /// releasing.
    #[inline]
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Overload { .. } | Self::InvalidJob { .. } | Self::PoolClosed
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::overload(12, 4);
        assert_eq!(
            err.to_string(),
            "Pool overloaded: 12 jobs queued across 4 slots"
        );
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("pool size must be at least 1");
        assert_eq!(
            err.to_string(),
            "Configuration error: pool size must be at least 1"
        );
    }

    #[test]
    fn test_invalid_job_display() {
        let err = Error::invalid_job("relative URL without a base");
        assert_eq!(err.to_string(), "Invalid job: relative URL without a base");
    }

    #[test]
    fn test_is_overload() {
        assert!(Error::overload(1, 1).is_overload());
        assert!(!Error::PoolClosed.is_overload());
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::condition_timeout(500).is_timeout());
        assert!(!Error::PoolClosed.is_timeout());
    }

    #[test]
    fn test_is_worker_error() {
        assert!(Error::worker_create(8080, "spawn failed").is_worker_error());
        assert!(!Error::PoolClosed.is_worker_error());
    }

    #[test]
    fn test_is_rejection() {
        assert!(Error::overload(0, 1).is_rejection());
        assert!(Error::invalid_job("bad url").is_rejection());
        assert!(Error::PoolClosed.is_rejection());
        assert!(!Error::worker_create(8080, "spawn failed").is_rejection());
    }
}

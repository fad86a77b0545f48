//! Worker bridge traits.
//!
//! The browser engine and its process bridge are external collaborators:
//! this crate only consumes them through the traits below. A production
//! bridge wraps a real headless-browser process; tests use an in-memory
//! mock ([`crate::testing`]).
//!
//! # Contract
//!
//! | Trait | Responsibility |
//! |-------|----------------|
//! | [`WorkerBridge`] | Spawns worker processes on a given port |
//! | [`WorkerHandle`] | One remote browser process: pages, teardown, crash hook |
//! | [`PageHandle`] | One page: navigation, script evaluation, observers |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::Result;

// ============================================================================
// Handler Types
// ============================================================================

/// Callback invoked when a worker process crashes.
///
/// Bound once at worker install time; never recreated per access.
pub type CrashHandler = Box<dyn Fn() + Send + Sync>;

/// Callback invoked for each console message emitted by a page.
pub type ConsoleHandler = Box<dyn Fn(String) + Send + Sync>;

/// Callback invoked when a page reports a script or runtime error.
pub type PageErrorHandler = Box<dyn Fn(String) + Send + Sync>;

// ============================================================================
// WorkerOptions
// ============================================================================

/// Options for spawning a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Control port the worker listens on.
    pub port: u16,
}

impl WorkerOptions {
    /// Creates options for the given port.
    #[inline]
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

// ============================================================================
// NavigationStatus
// ============================================================================

/// Outcome of a page navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationStatus {
    /// The page loaded.
    Success,
    /// The page failed to load.
    Failure,
}

impl NavigationStatus {
    /// Returns `true` for [`NavigationStatus::Success`].
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

// ============================================================================
// Bridge Traits
// ============================================================================

/// Factory for worker processes.
///
/// Implementations spawn one headless-browser process per [`create`] call
/// and hand back an opaque handle. Creation is expensive; the pool exists
/// to amortize it.
///
/// [`create`]: WorkerBridge::create
#[async_trait]
pub trait WorkerBridge: Send + Sync {
    /// Spawns a new worker process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerCreate`](crate::Error::WorkerCreate) if the
    /// process fails to start or does not become reachable.
    async fn create(&self, options: WorkerOptions) -> Result<Arc<dyn WorkerHandle>>;
}

/// One remote headless-browser process.
#[async_trait]
pub trait WorkerHandle: Send + Sync {
    /// Creates a new page in this worker.
    async fn create_page(&self) -> Result<Arc<dyn PageHandle>>;

    /// Tears the worker process down.
    ///
    /// Idempotent; safe to call on an already-dead worker.
    async fn exit(&self);

    /// Installs the crash handler for this worker.
    ///
    /// The handler fires at most once, when the underlying process dies
    /// unexpectedly. Bound once right after creation.
    fn set_crash_handler(&self, handler: CrashHandler);
}

/// One page inside a worker.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigates the page to `url` and reports the load status.
    async fn open(&self, url: &Url) -> Result<NavigationStatus>;

    /// Evaluates `script` in the page context with `argument` and returns
    /// the JSON-serialized result.
    async fn evaluate(&self, script: &str, argument: Value) -> Result<Value>;

    /// Installs the console-message observer for this page.
    fn set_console_handler(&self, handler: ConsoleHandler);

    /// Installs the page-error observer for this page.
    fn set_error_handler(&self, handler: PageErrorHandler);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_options() {
        let options = WorkerOptions::new(8910);
        assert_eq!(options.port, 8910);
    }

    #[test]
    fn test_navigation_status() {
        assert!(NavigationStatus::Success.is_success());
        assert!(!NavigationStatus::Failure.is_success());
    }
}

//! Job descriptors and their builder.
//!
//! A [`Job`] describes one unit of automation work: a URL to open, an
//! optional readiness [`Condition`] polled inside the worker page, and an
//! action to run against the page once ready. Descriptors are validated
//! synchronously at build time; a malformed descriptor never reaches any
//! asynchronous machinery.
//!
//! # Example
//!
//! ```no_run
//! use headless_pool::{Condition, Job};
//! use std::time::Duration;
//!
//! # fn example() -> headless_pool::Result<()> {
//! let job = Job::builder("https://example.com")
//!     .condition(Condition::selector("#results"))
//!     .timeout(Duration::from_secs(10))
//!     .action(|page| Box::pin(async move {
//!         let _ = page.evaluate("document.title", serde_json::Value::Null).await;
//!     }))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;
use url::Url;

use crate::bridge::PageHandle;
use crate::error::{Error, Result};
use crate::events::ObserverSet;

// ============================================================================
// Action Type
// ============================================================================

/// The job's extraction action, run once the page is ready.
///
/// Receives the page handle; consumed exactly once.
pub type ActionFn = Box<dyn FnOnce(Arc<dyn PageHandle>) -> BoxFuture<'static, ()> + Send>;

// ============================================================================
// Condition
// ============================================================================

/// A readiness predicate evaluated inside the worker's page context.
///
/// The script is polled on a fixed period until it returns a truthy value
/// or the job's timeout elapses.
#[derive(Debug, Clone)]
pub struct Condition {
    /// Script evaluated in the page context.
    pub script: String,
    /// Argument passed to the script. Defaults to JSON null.
    pub argument: Value,
}

impl Condition {
    /// Creates a condition from a script with a null argument.
    #[inline]
    #[must_use]
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            argument: Value::Null,
        }
    }

    /// Creates a condition from a script and an argument.
    #[inline]
    #[must_use]
    pub fn with_argument(script: impl Into<String>, argument: Value) -> Self {
        Self {
            script: script.into(),
            argument,
        }
    }

    /// Creates a condition satisfied when at least one element matches the
    /// CSS selector.
    #[inline]
    #[must_use]
    pub fn selector(css: impl Into<String>) -> Self {
        Self::selector_min_count(css, 1)
    }

    /// Creates a condition satisfied when at least `min_count` elements
    /// match the CSS selector.
    #[must_use]
    pub fn selector_min_count(css: impl Into<String>, min_count: usize) -> Self {
        Self::with_argument(
            "function(arg) { return document.querySelectorAll(arg.selector).length >= arg.minCount; }",
            serde_json::json!({ "selector": css.into(), "minCount": min_count }),
        )
    }
}

// ============================================================================
// Job
// ============================================================================

/// Duration used by [`JobBuilder::check_once`].
///
/// A "one-shot" condition check is modeled as a very short finite timeout
/// rather than a distinct code path: the first (immediate) poll runs, and
/// the second tick finds the timeout already expired.
pub const CHECK_ONCE_TIMEOUT: Duration = Duration::from_millis(1);

/// One unit of automation work.
///
/// Created by [`Job::builder`], consumed exactly once by a strategy
/// dispatch, terminal after `Finished`/`Halted`/`Failed`.
pub struct Job {
    /// Target URL.
    pub(crate) url: Url,
    /// Optional readiness condition.
    pub(crate) condition: Option<Condition>,
    /// Action to run once ready. `None` after consumption.
    pub(crate) action: Option<ActionFn>,
    /// Condition timeout. Zero means poll forever.
    pub(crate) timeout: Duration,
    /// Terminate the worker after the job, if the strategy allows it.
    pub(crate) close_when_finished: bool,
    /// Forward worker console messages as [`JobEvent::Console`] events.
    ///
    /// [`JobEvent::Console`]: crate::JobEvent::Console
    pub(crate) forward_console: bool,
    /// Lifecycle observers for this job.
    pub(crate) observers: Arc<ObserverSet>,
}

impl Job {
    /// Creates a job builder for the given URL.
    #[inline]
    #[must_use]
    pub fn builder(url: impl Into<String>) -> JobBuilder {
        JobBuilder::new(url)
    }

    /// Returns the target URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the readiness condition, if any.
    #[inline]
    #[must_use]
    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Returns the condition timeout. Zero means poll forever.
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the observer set for this job.
    ///
    /// Observers may be registered before or after dispatch; emission is
    /// synchronous notify-all.
    #[inline]
    #[must_use]
    pub fn observers(&self) -> &Arc<ObserverSet> {
        &self.observers
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("url", &self.url.as_str())
            .field("has_condition", &self.condition.is_some())
            .field("timeout", &self.timeout)
            .field("close_when_finished", &self.close_when_finished)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// JobBuilder
// ============================================================================

/// Builder for [`Job`] descriptors.
///
/// Validation happens in [`build`](JobBuilder::build): a bad URL or an
/// empty condition script is rejected synchronously with
/// [`Error::InvalidJob`].
pub struct JobBuilder {
    url: String,
    condition: Option<Condition>,
    action: Option<ActionFn>,
    timeout: Duration,
    close_when_finished: bool,
    forward_console: bool,
}

impl JobBuilder {
    /// Creates a new builder for the given URL.
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            condition: None,
            action: None,
            timeout: Duration::ZERO,
            close_when_finished: false,
            forward_console: false,
        }
    }

    /// Sets the readiness condition.
    #[inline]
    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Sets the extraction action.
    #[inline]
    #[must_use]
    pub fn action<F>(mut self, action: F) -> Self
    where
        F: FnOnce(Arc<dyn PageHandle>) -> BoxFuture<'static, ()> + Send + 'static,
    {
        self.action = Some(Box::new(action));
        self
    }

    /// Sets the condition timeout. Zero (the default) polls forever.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks the condition exactly once.
    ///
    /// Modeled as a [`CHECK_ONCE_TIMEOUT`] finite timeout.
    #[inline]
    #[must_use]
    pub fn check_once(mut self) -> Self {
        self.timeout = CHECK_ONCE_TIMEOUT;
        self
    }

    /// Requests worker termination after the job finishes.
    ///
    /// Only honored when the active strategy supports auto-close.
    #[inline]
    #[must_use]
    pub fn close_when_finished(mut self) -> Self {
        self.close_when_finished = true;
        self
    }

    /// Forwards worker console messages as `Console` events.
    #[inline]
    #[must_use]
    pub fn forward_console(mut self) -> Self {
        self.forward_console = true;
        self
    }

    /// Builds the job with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidJob`] if the URL does not parse
    /// - [`Error::InvalidJob`] if a condition has an empty script
    pub fn build(self) -> Result<Job> {
        let url = Url::parse(&self.url)
            .map_err(|e| Error::invalid_job(format!("URL {:?}: {e}", self.url)))?;

        if let Some(ref condition) = self.condition
            && condition.script.trim().is_empty()
        {
            return Err(Error::invalid_job("condition script is empty"));
        }

        Ok(Job {
            url,
            condition: self.condition,
            action: self.action,
            timeout: self.timeout,
            close_when_finished: self.close_when_finished,
            forward_console: self.forward_console,
            observers: Arc::new(ObserverSet::new()),
        })
    }
}

impl fmt::Debug for JobBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobBuilder")
            .field("url", &self.url)
            .field("has_condition", &self.condition.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

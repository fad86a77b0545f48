//! Headless Pool - Pooled dispatch for headless-browser jobs.
//!
//! This library runs scraping and automation jobs against a fleet of
//! headless-browser workers, with bounded per-worker queueing, lease
//! eviction for stuck jobs, and crash self-healing.
//!
//! # Architecture
//!
//! A [`Dispatcher`] admits [`Job`]s through a worker [`Strategy`]:
//!
//! - **Pooled strategies**: N worker slots, each with a bounded FIFO
//!   queue; slot selection by round-robin or uniform random, overflow to
//!   the least-loaded slot, hard [`Error::Overload`] cutoff beyond that
//! - **Single strategies**: a fresh worker per job (optionally on
//!   incrementing ports), or one worker recycled across jobs
//!
//! Each admitted job runs its own lifecycle: create page, navigate,
//! poll a readiness condition on a fixed period, run the action,
//! release. A watchdog evicts leases held past their timeout and
//! replaces the worker underneath.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use headless_pool::{
//!     Condition, DispatcherBuilder, Job, PoolOptions, Result, StrategyKind, WorkerBridge,
//! };
//!
//! async fn example(bridge: Arc<dyn WorkerBridge>) -> Result<()> {
//!     let dispatcher = DispatcherBuilder::new(bridge)
//!         .strategy(StrategyKind::RoundRobinPool)
//!         .pool_options(PoolOptions::new().size(4).queue_depth(4))
//!         .build()?;
//!
//!     let job = Job::builder("https://example.com")
//!         .condition(Condition::selector("#content"))
//!         .timeout(Duration::from_secs(30))
//!         .action(|page| {
//!             Box::pin(async move {
//!                 let _ = page.evaluate("extract()", serde_json::Value::Null).await;
//!             })
//!         })
//!         .build()?;
//!
//!     let handle = dispatcher.dispatch(job)?;
//!     let outcome = handle.wait().await;
//!     println!("job finished: {outcome:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | Worker/page abstraction implemented by browser backends |
//! | [`dispatcher`] | [`Dispatcher`], builder, and [`PoolOptions`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`events`] | Per-job lifecycle events and observers |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`job`] | [`Job`] description and builder |
//! | [`lease`] | Worker leases and release handles |
//! | [`lifecycle`] | Per-job state machine and [`JobHandle`] |
//! | [`pool`] | Slot pool engine and selection policies |
//! | [`strategy`] | Worker acquisition strategies |

// ============================================================================
// Modules
// ============================================================================

/// Worker and page abstraction implemented by browser backends.
pub mod bridge;

/// Dispatcher construction and job admission.
pub mod dispatcher;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Per-job lifecycle events and observer registration.
pub mod events;

/// Type-safe identifiers for jobs and subscriptions.
pub mod identifiers;

/// Job description, readiness conditions, and the job builder.
pub mod job;

/// Worker leases handed out by strategies and the pool.
pub mod lease;

/// The per-job lifecycle engine.
pub mod lifecycle;

/// Worker slot pool: engine, slots, and selection policies.
pub mod pool;

/// Worker acquisition strategies.
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Bridge types
pub use bridge::{
    ConsoleHandler, CrashHandler, NavigationStatus, PageErrorHandler, PageHandle, WorkerBridge,
    WorkerHandle, WorkerOptions,
};

// Dispatcher types
pub use dispatcher::{Dispatcher, DispatcherBuilder, PoolOptions};

// Error types
pub use error::{Error, Result};

// Event types
pub use events::{JobEvent, Observer, ObserverSet};

// Identifier types
pub use identifiers::{JobId, SubscriptionId};

// Job types
pub use job::{ActionFn, CHECK_ONCE_TIMEOUT, Condition, Job, JobBuilder};

// Lease types
pub use lease::{PendingLease, ReleaseHandle, WorkerLease};

// Lifecycle types
pub use lifecycle::{JobHandle, JobOutcome, LifecycleState, POLL_INTERVAL};

// Pool types
pub use pool::{PoolEngine, SelectionPolicy};

// Strategy types
pub use strategy::{Strategy, StrategyKind};

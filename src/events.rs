//! Lifecycle events and the observer set.
//!
//! Each [`Job`](crate::Job) owns an explicit [`ObserverSet`]: registration
//! and removal are plain collection operations, emission is a synchronous
//! notify-all over the collection. Observers see every transition of the
//! job's lifecycle state machine.
//!
//! # Event Order
//!
//! A successful job with a condition emits:
//!
//! ```text
//! WorkerCreated → PageCreated → PageOpened → Checking* → Ready → Finished
//! ```
//!
//! `Timeout` replaces `Ready` when the condition never satisfies in time;
//! `Halted` replaces `Finished` when the job was cancelled; `Failed` may
//! appear from any non-terminal state.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;

use crate::identifiers::SubscriptionId;

// ============================================================================
// JobEvent
// ============================================================================

/// Lifecycle event emitted by a running job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// A worker was acquired for the job.
    WorkerCreated,
    /// A page was created on the worker.
    PageCreated,
    /// Navigation completed with a success status.
    PageOpened,
    /// A condition poll is about to be evaluated.
    Checking,
    /// The readiness condition is satisfied (or no condition was set).
    Ready,
    /// The condition did not satisfy within the timeout; the action will
    /// not run.
    Timeout,
    /// A mid-flight failure: navigation, page error, or worker loss.
    Failed(String),
    /// The job reached its normal end of life.
    Finished,
    /// The job was cancelled externally.
    Halted,
    /// A console message forwarded from the worker page (opt-in).
    Console(String),
}

impl JobEvent {
    /// Returns `true` for events that end the job (`Finished`, `Halted`).
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Halted)
    }
}

// ============================================================================
// Observer Types
// ============================================================================

/// Observer callback invoked synchronously for each emitted event.
pub type Observer = Box<dyn Fn(&JobEvent) + Send + Sync>;

// ============================================================================
// ObserverSet
// ============================================================================

/// Explicit observer list owned by each job.
///
/// Thread-safe; emission holds the lock for the duration of notify-all,
/// so observers must not re-enter the same set.
#[derive(Default)]
pub struct ObserverSet {
    /// Registered observers with their subscription IDs.
    observers: Mutex<Vec<(SubscriptionId, Observer)>>,
}

impl ObserverSet {
    /// Creates an empty observer set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer and returns its subscription ID.
    pub fn add(&self, observer: Observer) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.observers.lock().push((id, observer));
        id
    }

    /// Removes an observer by subscription ID.
    ///
    /// Returns `true` if the observer was present.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(sub, _)| *sub != id);
        observers.len() != before
    }

    /// Returns the number of registered observers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    /// Returns `true` if no observers are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notifies every registered observer of `event`, in registration order.
    pub fn emit(&self, event: &JobEvent) {
        let observers = self.observers.lock();
        for (_, observer) in observers.iter() {
            observer(event);
        }
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("len", &self.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

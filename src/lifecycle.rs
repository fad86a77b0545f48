//! Job lifecycle engine.
//!
//! Drives one job to exactly one terminal outcome: acquire a leased
//! worker from the active strategy, create a page, navigate, poll the
//! readiness condition, run the action, release. Lifecycle events are
//! emitted at every transition.
//!
//! # State Machine
//!
//! ```text
//! Idle → Opening → PageCreating → Navigating ─┬─→ Ready ──→ Executing ─→ Finishing → Finished
//!                                             └─→ Polling ─┬─→ Ready ┘
//!                                                          └─→ TimedOut ─→ Finishing → Finished
//!
//! Halted / Failed are reachable from any non-terminal state.
//! ```
//!
//! Cancellation is fire-and-forget: [`JobHandle::halt`] requests
//! termination but in-flight worker-side operations are not interrupted;
//! the engine stops listening for their results and runs the finishing
//! sequence once.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Error;
use crate::events::{JobEvent, ObserverSet};
use crate::identifiers::JobId;
use crate::job::Job;
use crate::lease::{PendingLease, WorkerLease};
use crate::strategy::Strategy;

// ============================================================================
// Constants
// ============================================================================

/// Fixed period between condition polls.
///
/// Not phase-aligned across jobs; each job's first check runs immediately.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

// ============================================================================
// LifecycleState
// ============================================================================

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Dispatched, not yet started.
    Idle,
    /// Waiting for a worker lease.
    Opening,
    /// Creating a page on the leased worker.
    PageCreating,
    /// Navigating to the job URL.
    Navigating,
    /// Polling the readiness condition.
    Polling,
    /// Condition satisfied (or none was set).
    Ready,
    /// Condition never satisfied within the timeout.
    TimedOut,
    /// Running the job's action.
    Executing,
    /// Running the finishing sequence.
    Finishing,
    /// Terminal: ran to its end of life.
    Finished,
    /// Terminal: cancelled externally.
    Halted,
    /// Terminal: a mid-flight failure ended the job.
    Failed,
}

impl LifecycleState {
    /// Returns `true` for `Finished`, `Halted`, and `Failed`.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Halted | Self::Failed)
    }
}

// ============================================================================
// JobOutcome
// ============================================================================

/// Terminal outcome of a job, resolved by [`JobHandle::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job ran its action and finished.
    Completed,
    /// The condition never satisfied; the action did not run.
    TimedOut,
    /// The job was cancelled.
    Halted,
    /// A navigation, page, or worker failure ended the job.
    Failed,
}

// ============================================================================
// HaltSignal
// ============================================================================

/// One-shot cancellation signal shared between a handle and its runner.
pub(crate) struct HaltSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl HaltSignal {
    fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Requests termination. Idempotent.
    pub(crate) fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolves once triggered.
    pub(crate) async fn wait(&self) {
        while !self.flag.load(Ordering::SeqCst) {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.flag.load(Ordering::SeqCst) {
                break;
            }
            notified.await;
        }
    }
}

// ============================================================================
// JobContext
// ============================================================================

/// State shared between a [`JobHandle`] and the runner task.
pub(crate) struct JobContext {
    pub(crate) id: JobId,
    state: Mutex<LifecycleState>,
    pub(crate) halt: HaltSignal,
    pub(crate) observers: Arc<ObserverSet>,
}

impl JobContext {
    pub(crate) fn new(id: JobId, observers: Arc<ObserverSet>) -> Self {
        Self {
            id,
            state: Mutex::new(LifecycleState::Idle),
            halt: HaltSignal::new(),
            observers,
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    fn set_state(&self, state: LifecycleState) {
        *self.state.lock() = state;
    }

    fn emit(&self, event: JobEvent) {
        self.observers.emit(&event);
    }
}

// ============================================================================
// JobHandle
// ============================================================================

/// Handle to a dispatched job.
///
/// Dropping the handle does not cancel the job.
pub struct JobHandle {
    ctx: Arc<JobContext>,
    join: JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub(crate) fn new(ctx: Arc<JobContext>, join: JoinHandle<JobOutcome>) -> Self {
        Self { ctx, join }
    }

    /// Returns the job's ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> JobId {
        self.ctx.id
    }

    /// Returns the job's current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.ctx.state()
    }

    /// Requests cancellation. Fire-and-forget.
    ///
    /// The job runs its finishing sequence once, emitting `Halted` instead
    /// of `Finished`; in-flight worker-side operations are not stopped,
    /// only ignored.
    pub fn halt(&self) {
        debug!(job = %self.ctx.id, "Halt requested");
        self.ctx.halt.trigger();
    }

    /// Waits for the job's terminal outcome.
    pub async fn wait(self) -> JobOutcome {
        self.join.await.unwrap_or(JobOutcome::Failed)
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.ctx.id)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Races `future` against the job's halt signal.
async fn with_halt<T>(ctx: &JobContext, future: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = ctx.halt.wait() => None,
        value = future => Some(value),
    }
}

/// JSON truthiness for condition results.
///
/// `null`, `false`, `0`, and `""` are unsatisfied; everything else
/// satisfies the condition.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// What ended the job.
enum FinishCause {
    Completed,
    TimedOut,
    Failed,
    Halted,
}

/// Drives one job to its terminal outcome.
pub(crate) async fn run(
    mut job: Job,
    strategy: Arc<Strategy>,
    pending: PendingLease,
    ctx: Arc<JobContext>,
) -> JobOutcome {
    // ------------------------------------------------------------------
    // Acquire a leased worker.
    // ------------------------------------------------------------------
    ctx.set_state(LifecycleState::Opening);

    let lease = match with_halt(&ctx, pending.wait()).await {
        None => return finish(&ctx, job.close_when_finished, &strategy, None, FinishCause::Halted).await,
        Some(Err(e)) => {
            warn!(job = %ctx.id, error = %e, "Lease acquisition failed");
            ctx.emit(JobEvent::Failed(e.to_string()));
            return finish(&ctx, job.close_when_finished, &strategy, None, FinishCause::Failed).await;
        }
        Some(Ok(lease)) => lease,
    };
    ctx.emit(JobEvent::WorkerCreated);

    // ------------------------------------------------------------------
    // Create a page and attach observers.
    // ------------------------------------------------------------------
    ctx.set_state(LifecycleState::PageCreating);

    let page = match with_halt(&ctx, lease.worker().create_page()).await {
        None => return finish(&ctx, job.close_when_finished, &strategy, Some(&lease), FinishCause::Halted).await,
        Some(Err(e)) => {
            ctx.emit(JobEvent::Failed(e.to_string()));
            return finish(&ctx, job.close_when_finished, &strategy, Some(&lease), FinishCause::Failed).await;
        }
        Some(Ok(page)) => page,
    };
    ctx.emit(JobEvent::PageCreated);

    // Mid-flight page failures become a Failed emission; a polling job
    // notices the flag on its next tick.
    let page_failed = Arc::new(AtomicBool::new(false));
    {
        let observers = Arc::clone(&ctx.observers);
        let flag = Arc::clone(&page_failed);
        page.set_error_handler(Box::new(move |message| {
            flag.store(true, Ordering::SeqCst);
            observers.emit(&JobEvent::Failed(Error::page(message).to_string()));
        }));
    }
    if job.forward_console {
        let observers = Arc::clone(&ctx.observers);
        page.set_console_handler(Box::new(move |message| {
            observers.emit(&JobEvent::Console(message));
        }));
    }

    // ------------------------------------------------------------------
    // Navigate.
    // ------------------------------------------------------------------
    ctx.set_state(LifecycleState::Navigating);

    match with_halt(&ctx, page.open(&job.url)).await {
        None => return finish(&ctx, job.close_when_finished, &strategy, Some(&lease), FinishCause::Halted).await,
        Some(Err(e)) => {
            ctx.emit(JobEvent::Failed(e.to_string()));
            return finish(&ctx, job.close_when_finished, &strategy, Some(&lease), FinishCause::Failed).await;
        }
        Some(Ok(status)) if !status.is_success() => {
            let error = Error::navigation_failed(job.url.as_str());
            warn!(job = %ctx.id, url = %job.url, "Navigation failed");
            ctx.emit(JobEvent::Failed(error.to_string()));
            return finish(&ctx, job.close_when_finished, &strategy, Some(&lease), FinishCause::Failed).await;
        }
        Some(Ok(_)) => {}
    }
    ctx.emit(JobEvent::PageOpened);

    // ------------------------------------------------------------------
    // Poll the readiness condition, if one was set.
    // ------------------------------------------------------------------
    if let Some(condition) = job.condition.take() {
        ctx.set_state(LifecycleState::Polling);

        let start = Instant::now();
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        let mut first_check = true;

        loop {
            if with_halt(&ctx, ticker.tick()).await.is_none() {
                return finish(&ctx, job.close_when_finished, &strategy, Some(&lease), FinishCause::Halted).await;
            }

            if page_failed.load(Ordering::SeqCst) {
                // Failed was already emitted by the page error handler.
                return finish(&ctx, job.close_when_finished, &strategy, Some(&lease), FinishCause::Failed).await;
            }

            // The first check always runs; later ticks time out before
            // evaluating again, so a one-shot timeout checks exactly once.
            // Zero means never time out.
            if !first_check && !job.timeout.is_zero() && start.elapsed() > job.timeout {
                let error = Error::condition_timeout(job.timeout.as_millis() as u64);
                warn!(job = %ctx.id, error = %error, "Condition polling timed out");
                ctx.set_state(LifecycleState::TimedOut);
                ctx.emit(JobEvent::Timeout);
                return finish(&ctx, job.close_when_finished, &strategy, Some(&lease), FinishCause::TimedOut)
                    .await;
            }
            first_check = false;

            ctx.emit(JobEvent::Checking);

            let result = with_halt(
                &ctx,
                page.evaluate(&condition.script, condition.argument.clone()),
            )
            .await;

            match result {
                None => {
                    return finish(&ctx, job.close_when_finished, &strategy, Some(&lease), FinishCause::Halted)
                        .await;
                }
                Some(Err(e)) => {
                    ctx.emit(JobEvent::Failed(e.to_string()));
                    return finish(&ctx, job.close_when_finished, &strategy, Some(&lease), FinishCause::Failed)
                        .await;
                }
                Some(Ok(value)) if is_truthy(&value) => {
                    ctx.set_state(LifecycleState::Ready);
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    } else {
        ctx.set_state(LifecycleState::Ready);
    }

    // A page error reported before readiness fails the job without
    // running its action; Failed was emitted by the error handler.
    if page_failed.load(Ordering::SeqCst) {
        return finish(&ctx, job.close_when_finished, &strategy, Some(&lease), FinishCause::Failed).await;
    }

    ctx.emit(JobEvent::Ready);

    // ------------------------------------------------------------------
    // Run the action.
    // ------------------------------------------------------------------
    if let Some(action) = job.action.take() {
        ctx.set_state(LifecycleState::Executing);

        if with_halt(&ctx, action(Arc::clone(&page))).await.is_none() {
            return finish(&ctx, job.close_when_finished, &strategy, Some(&lease), FinishCause::Halted).await;
        }
    }

    // A page error during the action still ends the job as a failure.
    if page_failed.load(Ordering::SeqCst) {
        return finish(&ctx, job.close_when_finished, &strategy, Some(&lease), FinishCause::Failed).await;
    }

    finish(&ctx, job.close_when_finished, &strategy, Some(&lease), FinishCause::Completed).await
}

/// Runs the finishing sequence exactly once and returns the outcome.
///
/// Emits `Finished` (or `Halted` for a cancellation), releases the lease,
/// and terminates the worker iff the job asked for auto-close and the
/// strategy supports it.
async fn finish(
    ctx: &JobContext,
    close_when_finished: bool,
    strategy: &Strategy,
    lease: Option<&WorkerLease>,
    cause: FinishCause,
) -> JobOutcome {
    ctx.set_state(LifecycleState::Finishing);

    let (event, outcome, terminal) = match cause {
        FinishCause::Completed => {
            (JobEvent::Finished, JobOutcome::Completed, LifecycleState::Finished)
        }
        FinishCause::TimedOut => {
            (JobEvent::Finished, JobOutcome::TimedOut, LifecycleState::Finished)
        }
        FinishCause::Failed => (JobEvent::Finished, JobOutcome::Failed, LifecycleState::Failed),
        FinishCause::Halted => (JobEvent::Halted, JobOutcome::Halted, LifecycleState::Halted),
    };

    ctx.emit(event);

    if let Some(lease) = lease {
        lease.release();

        if close_when_finished && strategy.supports_auto_close() {
            debug!(job = %ctx.id, "Auto-closing worker");
            lease.worker().exit().await;
        }
    }

    ctx.set_state(terminal);
    debug!(job = %ctx.id, state = ?terminal, "Job reached terminal state");
    outcome
}

// ============================================================================
// Tests
// ============================================================================

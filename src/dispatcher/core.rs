//! Job dispatch and tracking.
//!
//! The [`Dispatcher`] is the crate's front door: it admits jobs through
//! the active worker strategy, spawns a lifecycle runner per job, and
//! tracks in-flight jobs so [`close`](Dispatcher::close) can halt them.
//!
//! Admission is synchronous. When the strategy cannot take the job
//! (pool at capacity) [`dispatch`](Dispatcher::dispatch) returns
//! [`Error::Overload`](crate::Error::Overload) immediately; nothing is
//! spawned and no event is emitted.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::error::Result;
use crate::identifiers::JobId;
use crate::job::Job;
use crate::lifecycle::{self, JobContext, JobHandle};
use crate::strategy::Strategy;

// ============================================================================
// Dispatcher
// ============================================================================

/// Handle to a running dispatcher. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    strategy: Arc<Strategy>,
    jobs: Mutex<FxHashMap<JobId, Arc<JobContext>>>,
}

impl Dispatcher {
    pub(crate) fn new(strategy: Strategy) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                strategy: Arc::new(strategy),
                jobs: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    /// Admits `job` and spawns its lifecycle runner.
    ///
    /// Returns a [`JobHandle`] for observing, awaiting, or halting the
    /// job. Dropping the handle does not cancel the job.
    ///
    /// # Errors
    ///
    /// Fails synchronously when the strategy rejects admission, most
    /// notably with an overload from a saturated pool.
    pub fn dispatch(&self, job: Job) -> Result<JobHandle> {
        let pending = self.inner.strategy.open()?;

        let id = JobId::new();
        let ctx = Arc::new(JobContext::new(id, Arc::clone(job.observers())));
        self.inner.jobs.lock().insert(id, Arc::clone(&ctx));

        debug!(job = %id, url = %job.url(), "Job dispatched");

        let inner = Arc::clone(&self.inner);
        let runner_ctx = Arc::clone(&ctx);
        let strategy = Arc::clone(&self.inner.strategy);
        let join = tokio::spawn(async move {
            let outcome = lifecycle::run(job, strategy, pending, runner_ctx).await;
            inner.jobs.lock().remove(&id);
            outcome
        });

        Ok(JobHandle::new(ctx, join))
    }

    /// Number of jobs currently in flight.
    #[inline]
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.inner.jobs.lock().len()
    }

    /// Halts every in-flight job and tears down the strategy's workers.
    ///
    /// Jobs observe the halt on their next await point; this does not
    /// wait for them to reach a terminal state.
    pub async fn close(&self) {
        let jobs: Vec<Arc<JobContext>> = self.inner.jobs.lock().values().cloned().collect();
        info!(jobs = jobs.len(), "Closing dispatcher");

        for ctx in jobs {
            ctx.halt.trigger();
        }
        self.inner.strategy.exit().await;
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("strategy", &self.inner.strategy)
            .field("jobs", &self.job_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use serde_json::json;

    use crate::dispatcher::{DispatcherBuilder, PoolOptions};
    use crate::events::JobEvent;
    use crate::job::Condition;
    use crate::lifecycle::JobOutcome;
    use crate::strategy::StrategyKind;
    use crate::testing::{MockBridge, action_counter, record_events};

    fn pooled_dispatcher(bridge: &Arc<MockBridge>, size: usize, depth: usize) -> Dispatcher {
        crate::testing::init_tracing();
        DispatcherBuilder::new(Arc::clone(bridge) as _)
            .strategy(StrategyKind::RoundRobinPool)
            .pool_options(
                PoolOptions::new()
                    .size(size)
                    .queue_depth(depth)
                    .base_port(9000)
                    .lease_timeout(Duration::from_secs(30)),
            )
            .build()
            .expect("build")
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_pooled_job() {
        let bridge = MockBridge::shared();
        bridge.set_eval_results(vec![json!(false), json!(true)]);
        let dispatcher = pooled_dispatcher(&bridge, 2, 2);

        let (action, count) = action_counter();
        let job = Job::builder("https://example.com/target")
            .condition(Condition::selector("#done"))
            .timeout(Duration::from_secs(5))
            .action(action)
            .build()
            .expect("job");
        let events = record_events(&job);

        let handle = dispatcher.dispatch(job).expect("dispatch");
        assert_eq!(dispatcher.job_count(), 1);

        let outcome = handle.wait().await;
        assert_eq!(outcome, JobOutcome::Completed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.job_count(), 0);

        let events = events.lock();
        assert_eq!(events.first(), Some(&JobEvent::WorkerCreated));
        assert_eq!(events.last(), Some(&JobEvent::Finished));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_surfaces_overload_synchronously() {
        let bridge = MockBridge::shared();
        let dispatcher = pooled_dispatcher(&bridge, 1, 2);

        // Jobs that poll forever keep their leases held.
        let stuck = || {
            Job::builder("https://example.com")
                .condition(Condition::new("check()"))
                .build()
                .expect("job")
        };

        let a = dispatcher.dispatch(stuck()).expect("active");
        let b = dispatcher.dispatch(stuck()).expect("queued");

        let err = dispatcher.dispatch(stuck()).expect_err("must overload");
        assert!(err.is_overload());

        a.halt();
        b.halt();
        a.wait().await;
        b.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_halts_in_flight_jobs() {
        let bridge = MockBridge::shared();
        let dispatcher = pooled_dispatcher(&bridge, 2, 2);

        let job = Job::builder("https://example.com")
            .condition(Condition::new("check()"))
            .build()
            .expect("job");
        let handle = dispatcher.dispatch(job).expect("dispatch");

        // Let the job reach its polling loop first.
        tokio::time::sleep(Duration::from_millis(300)).await;

        dispatcher.close().await;
        assert_eq!(handle.wait().await, JobOutcome::Halted);
        assert_eq!(dispatcher.job_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_jobs_run_after_release() {
        let bridge = MockBridge::shared();
        let dispatcher = pooled_dispatcher(&bridge, 1, 2);

        let (first_action, first) = action_counter();
        let (second_action, second) = action_counter();

        let a = dispatcher
            .dispatch(
                Job::builder("https://example.com/a")
                    .action(first_action)
                    .build()
                    .expect("job"),
            )
            .expect("dispatch a");
        let b = dispatcher
            .dispatch(
                Job::builder("https://example.com/b")
                    .action(second_action)
                    .build()
                    .expect("job"),
            )
            .expect("dispatch b");

        assert_eq!(a.wait().await, JobOutcome::Completed);
        assert_eq!(b.wait().await, JobOutcome::Completed);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        // One slot, one worker; both jobs shared it.
        assert_eq!(bridge.created_ports(), vec![9000]);
    }
}

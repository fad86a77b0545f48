//! Dispatch throughput benchmark suite.
//!
//! Benchmarks slot selection and end-to-end job dispatch against an
//! in-memory worker bridge (no real browser involved):
//! - Pool sizes: 4, 16, 64
//!
//! Run with: cargo bench --bench dispatch
//! Results saved to: target/criterion/

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::Value;
use tokio::runtime::Runtime;
use url::Url;

use headless_pool::{
    ConsoleHandler, CrashHandler, DispatcherBuilder, Job, NavigationStatus, PageErrorHandler,
    PageHandle, PoolOptions, Result, SelectionPolicy, StrategyKind, WorkerBridge, WorkerHandle,
    WorkerOptions,
};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const POOL_SIZES: &[usize] = &[4, 16, 64];

// ============================================================================
// In-Memory Bridge
// ============================================================================

struct NoopBridge;
struct NoopWorker;
struct NoopPage;

#[async_trait]
impl WorkerBridge for NoopBridge {
    async fn create(&self, _options: WorkerOptions) -> Result<Arc<dyn WorkerHandle>> {
        Ok(Arc::new(NoopWorker))
    }
}

#[async_trait]
impl WorkerHandle for NoopWorker {
    async fn create_page(&self) -> Result<Arc<dyn PageHandle>> {
        Ok(Arc::new(NoopPage))
    }

    async fn exit(&self) {}

    fn set_crash_handler(&self, _handler: CrashHandler) {}
}

#[async_trait]
impl PageHandle for NoopPage {
    async fn open(&self, _url: &Url) -> Result<NavigationStatus> {
        Ok(NavigationStatus::Success)
    }

    async fn evaluate(&self, _script: &str, _argument: Value) -> Result<Value> {
        Ok(Value::Bool(true))
    }

    fn set_console_handler(&self, _handler: ConsoleHandler) {}

    fn set_error_handler(&self, _handler: PageErrorHandler) {}
}

// ============================================================================
// Benchmark: Slot Selection
// ============================================================================

fn bench_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("selection");

    for &size in POOL_SIZES {
        group.bench_with_input(BenchmarkId::new("round_robin", size), &size, |b, &size| {
            let mut policy = SelectionPolicy::round_robin();
            b.iter(|| policy.next(size));
        });
        group.bench_with_input(BenchmarkId::new("random", size), &size, |b, &size| {
            let mut policy = SelectionPolicy::random();
            b.iter(|| policy.next(size));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: End-to-End Dispatch
// ============================================================================

fn bench_dispatch(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    let mut group = c.benchmark_group("dispatch");
    group.measurement_time(Duration::from_secs(10));

    for &size in POOL_SIZES {
        group.bench_with_input(
            BenchmarkId::new("round_robin_pool", size),
            &size,
            |b, &size| {
                // The pool spawns its watchdog at construction time.
                let dispatcher = {
                    let _guard = rt.enter();
                    DispatcherBuilder::new(Arc::new(NoopBridge))
                        .strategy(StrategyKind::RoundRobinPool)
                        .pool_options(PoolOptions::new().size(size).queue_depth(4))
                        .build()
                        .expect("build")
                };

                b.to_async(&rt).iter(|| {
                    let dispatcher = dispatcher.clone();
                    async move {
                        let job = Job::builder("https://example.com")
                            .build()
                            .expect("job");
                        dispatcher
                            .dispatch(job)
                            .expect("dispatch")
                            .wait()
                            .await
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_selection, bench_dispatch);
criterion_main!(benches);

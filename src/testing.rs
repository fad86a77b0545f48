//! In-memory worker bridge used by the test suites.
//!
//! [`MockBridge`] stands in for a real browser bridge: workers are created
//! instantly, pages navigate without I/O, and the tests script failures,
//! condition results, console output, and crashes through shared knobs.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use url::Url;

use crate::bridge::{
    ConsoleHandler, CrashHandler, NavigationStatus, PageErrorHandler, PageHandle, WorkerBridge,
    WorkerHandle, WorkerOptions,
};
use crate::error::{Error, Result};
use crate::events::JobEvent;
use crate::job::Job;

// ============================================================================
// Shared Behavior Knobs
// ============================================================================

#[derive(Default)]
struct Behavior {
    fail_creates: AtomicBool,
    navigation_fails: AtomicBool,
    eval_results: Mutex<VecDeque<Value>>,
    console_messages: Mutex<Vec<String>>,
    page_error: Mutex<Option<String>>,
}

// ============================================================================
// MockBridge
// ============================================================================

/// Scriptable [`WorkerBridge`] for tests.
#[derive(Default)]
pub(crate) struct MockBridge {
    behavior: Arc<Behavior>,
    workers: Mutex<Vec<Arc<MockWorker>>>,
    created_ports: Mutex<Vec<u16>>,
}

impl MockBridge {
    pub(crate) fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// When set, every subsequent `create` returns an error.
    pub(crate) fn fail_creates(&self, fail: bool) {
        self.behavior.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// When set, every page navigation reports failure.
    pub(crate) fn set_navigation_fails(&self, fail: bool) {
        self.behavior.navigation_fails.store(fail, Ordering::SeqCst);
    }

    /// Scripts condition evaluations, consumed front to back.
    ///
    /// Once exhausted, evaluations report `false`.
    pub(crate) fn set_eval_results(&self, results: Vec<Value>) {
        *self.behavior.eval_results.lock() = results.into();
    }

    /// Console lines emitted during every page navigation.
    pub(crate) fn set_console_messages(&self, messages: Vec<String>) {
        *self.behavior.console_messages.lock() = messages;
    }

    /// A page error raised during every page navigation.
    pub(crate) fn set_page_error(&self, message: Option<String>) {
        *self.behavior.page_error.lock() = message;
    }

    /// Ports of every worker created so far, in creation order.
    pub(crate) fn created_ports(&self) -> Vec<u16> {
        self.created_ports.lock().clone()
    }

    /// Every worker created so far, in creation order.
    pub(crate) fn workers(&self) -> Vec<Arc<MockWorker>> {
        self.workers.lock().clone()
    }
}

#[async_trait]
impl WorkerBridge for MockBridge {
    async fn create(&self, options: WorkerOptions) -> Result<Arc<dyn WorkerHandle>> {
        if self.behavior.fail_creates.load(Ordering::SeqCst) {
            return Err(Error::worker_create(options.port, "mock create failure"));
        }

        let worker = Arc::new(MockWorker {
            port: options.port,
            behavior: Arc::clone(&self.behavior),
            crash_handler: Mutex::new(None),
            has_exited: AtomicBool::new(false),
        });
        self.created_ports.lock().push(options.port);
        self.workers.lock().push(Arc::clone(&worker));
        Ok(worker)
    }
}

// ============================================================================
// MockWorker
// ============================================================================

pub(crate) struct MockWorker {
    port: u16,
    behavior: Arc<Behavior>,
    crash_handler: Mutex<Option<CrashHandler>>,
    has_exited: AtomicBool,
}

impl MockWorker {
    /// Simulates a browser process crash by firing the bound handler.
    pub(crate) fn trigger_crash(&self) {
        let handler = self.crash_handler.lock().take();
        if let Some(handler) = handler {
            handler();
        }
    }

    pub(crate) fn exited(&self) -> bool {
        self.has_exited.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub(crate) fn port(&self) -> u16 {
        self.port
    }
}

#[async_trait]
impl WorkerHandle for MockWorker {
    async fn create_page(&self) -> Result<Arc<dyn PageHandle>> {
        Ok(Arc::new(MockPage {
            behavior: Arc::clone(&self.behavior),
            console_handler: Mutex::new(None),
            error_handler: Mutex::new(None),
        }))
    }

    async fn exit(&self) {
        self.has_exited.store(true, Ordering::SeqCst);
    }

    fn set_crash_handler(&self, handler: CrashHandler) {
        *self.crash_handler.lock() = Some(handler);
    }
}

// ============================================================================
// MockPage
// ============================================================================

pub(crate) struct MockPage {
    behavior: Arc<Behavior>,
    console_handler: Mutex<Option<ConsoleHandler>>,
    error_handler: Mutex<Option<PageErrorHandler>>,
}

#[async_trait]
impl PageHandle for MockPage {
    async fn open(&self, _url: &Url) -> Result<NavigationStatus> {
        if let Some(message) = self.behavior.page_error.lock().clone()
            && let Some(handler) = self.error_handler.lock().as_ref()
        {
            handler(message);
        }
        let messages = self.behavior.console_messages.lock().clone();
        if let Some(handler) = self.console_handler.lock().as_ref() {
            for message in messages {
                handler(message);
            }
        }

        if self.behavior.navigation_fails.load(Ordering::SeqCst) {
            Ok(NavigationStatus::Failure)
        } else {
            Ok(NavigationStatus::Success)
        }
    }

    async fn evaluate(&self, _script: &str, _argument: Value) -> Result<Value> {
        Ok(self
            .behavior
            .eval_results
            .lock()
            .pop_front()
            .unwrap_or(Value::Bool(false)))
    }

    fn set_console_handler(&self, handler: ConsoleHandler) {
        *self.console_handler.lock() = Some(handler);
    }

    fn set_error_handler(&self, handler: PageErrorHandler) {
        *self.error_handler.lock() = Some(handler);
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

/// Installs a per-test tracing subscriber honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call wins.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Records every event a job emits, in emission order.
pub(crate) fn record_events(job: &Job) -> Arc<Mutex<Vec<JobEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    job.observers().add(Box::new(move |event| {
        sink.lock().push(event.clone());
    }));
    events
}

/// An action that counts its invocations.
#[allow(clippy::type_complexity)]
pub(crate) fn action_counter() -> (
    impl FnOnce(Arc<dyn PageHandle>) -> BoxFuture<'static, ()> + Send + 'static,
    Arc<AtomicUsize>,
) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let action = move |_page: Arc<dyn PageHandle>| {
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        .boxed()
    };
    (action, count)
}

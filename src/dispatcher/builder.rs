//! Dispatcher construction.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::info;

use crate::bridge::WorkerBridge;
use crate::dispatcher::core::Dispatcher;
use crate::dispatcher::options::PoolOptions;
use crate::error::Result;
use crate::pool::{PoolEngine, SelectionPolicy};
use crate::strategy::{Strategy, StrategyKind};

// ============================================================================
// DispatcherBuilder
// ============================================================================

/// Builds a [`Dispatcher`] over a worker bridge.
///
/// The worker strategy defaults to a round-robin pool with the default
/// [`PoolOptions`]; the single-worker strategies ignore the pool options
/// and use only [`port`](Self::port).
pub struct DispatcherBuilder {
    bridge: Arc<dyn WorkerBridge>,
    kind: StrategyKind,
    pool: PoolOptions,
    port: u16,
}

impl DispatcherBuilder {
    /// Starts a builder over `bridge`.
    #[must_use]
    pub fn new(bridge: Arc<dyn WorkerBridge>) -> Self {
        Self {
            bridge,
            kind: StrategyKind::default(),
            pool: PoolOptions::default(),
            port: 8910,
        }
    }

    /// Selects the worker strategy.
    #[inline]
    #[must_use]
    pub fn strategy(mut self, kind: StrategyKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the pool options; only meaningful for the pooled strategies.
    #[inline]
    #[must_use]
    pub fn pool_options(mut self, options: PoolOptions) -> Self {
        self.pool = options;
        self
    }

    /// Sets the worker port for the single-worker strategies.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Constructs the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) when the pool
    /// options are degenerate.
    pub fn build(self) -> Result<Dispatcher> {
        let strategy = match self.kind {
            StrategyKind::AlwaysNew => Strategy::always_new(self.bridge, self.port),
            StrategyKind::AlwaysNewIncrementingPort => {
                Strategy::always_new_incrementing_port(self.bridge, self.port)
            }
            StrategyKind::RecycleOne => Strategy::recycle_one(self.bridge, self.port),
            StrategyKind::RoundRobinPool | StrategyKind::RandomPool => {
                self.pool.validate()?;
                let policy = if self.kind == StrategyKind::RandomPool {
                    SelectionPolicy::random()
                } else {
                    SelectionPolicy::round_robin()
                };
                Strategy::pooled(PoolEngine::new(self.bridge, policy, &self.pool))
            }
        };

        info!(strategy = ?self.kind, "Dispatcher built");
        Ok(Dispatcher::new(strategy))
    }
}

impl std::fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("kind", &self.kind)
            .field("pool", &self.pool)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

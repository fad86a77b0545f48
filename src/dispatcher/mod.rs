//! Dispatcher construction and job admission.

mod builder;
mod core;
mod options;

pub use builder::DispatcherBuilder;
pub use core::Dispatcher;
pub use options::PoolOptions;

//! Worker-pool scheduler.
//!
//! Internal module. The pool engine owns the slots; jobs reach it through
//! a [`Strategy`](crate::Strategy), never directly.

mod engine;
mod selection;
mod slot;

pub use engine::PoolEngine;
pub use selection::SelectionPolicy;

//! Database connection helpers

pub mod pool;

pub use pool::*;

//! # speval Common Library
//!
//! Shared code for the speech evaluation services including:
//! - Error type shared by every crate
//! - Bootstrap configuration loading and root folder resolution
//! - Tracing subscriber initialization
//! - Event types (EvalEvent enum) and the broadcast EventBus
//! - SQLite connection pool construction

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};

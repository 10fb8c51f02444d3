//! Test Helper Utilities
//!
//! Shared utilities for testing speval-orch

#![allow(dead_code)]

pub mod analyzers;
pub mod db_utils;
pub mod dispatchers;
pub mod fixtures;
pub mod log_capture;

pub use analyzers::{canned_registry, canned_result, StaticAnalyzer};
pub use db_utils::{
    backdate_task, complete_component, count_rows, create_test_db, fail_component, seed_awaiting_summary,
    seed_processing_task,
};
pub use dispatchers::RecordingDispatcher;
pub use fixtures::{build_service, build_service_with, sample_metadata, transcript_result};
pub use log_capture::LogCapture;

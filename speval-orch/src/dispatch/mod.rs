//! Work dispatch
//!
//! `JobDispatcher` is the seam between the orchestrator and whatever executes
//! jobs. Delivery is at-least-once: consumers must tolerate redelivery, which
//! the status updater and final summarizer do.

pub mod analyzer;
pub mod channel;

pub use analyzer::{normalize_result, AnalysisError, Analyzer, AnalyzerRegistry, HttpAnalyzer};
pub use channel::{ChannelDispatcher, JobRunner, QueuedJob, WorkerPool};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{JobArgs, JobHandle};

/// Dispatcher refused a job
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Job queue is closed")]
    Closed,

    #[error("Job rejected: {0}")]
    Rejected(String),
}

/// Hands jobs to workers
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Accept a job for asynchronous execution
    async fn enqueue(&self, job: JobArgs) -> Result<JobHandle, DispatchError>;
}

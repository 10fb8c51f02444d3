//! In-process dispatch
//!
//! `ChannelDispatcher` pushes jobs into a bounded tokio mpsc queue. The
//! `WorkerPool` drains it, running at most `worker_count` jobs at once. Jobs never
//! wait on each other; they coordinate only through the rows they report to.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{normalize_result, AnalysisError, AnalyzerRegistry, DispatchError, JobDispatcher};
use crate::models::{ComponentKind, JobArgs, JobHandle};
use crate::services::{ComponentReport, EvaluationService};

/// Job plus the handle returned to the enqueuer
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub handle: JobHandle,
    pub args: JobArgs,
}

/// Dispatcher backed by a bounded mpsc channel
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::Sender<QueuedJob>,
}

impl ChannelDispatcher {
    /// Create the dispatcher and the receiving end for a `WorkerPool`
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<QueuedJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl JobDispatcher for ChannelDispatcher {
    async fn enqueue(&self, job: JobArgs) -> Result<JobHandle, DispatchError> {
        let handle = JobHandle::for_job(&job);
        self.tx
            .send(QueuedJob {
                handle: handle.clone(),
                args: job,
            })
            .await
            .map_err(|_| DispatchError::Closed)?;
        Ok(handle)
    }
}

/// Executes one job against the analyzers and reports the result
pub struct JobRunner {
    registry: AnalyzerRegistry,
    service: Arc<EvaluationService>,
}

impl JobRunner {
    pub fn new(registry: AnalyzerRegistry, service: Arc<EvaluationService>) -> Self {
        Self { registry, service }
    }

    pub async fn run(&self, job: QueuedJob) {
        debug!(job_id = %job.handle.job_id, job = %job.handle.job_name, "Job started");

        match &job.args {
            JobArgs::FinalSummary { parent_task_id } => {
                let task_id = *parent_task_id;
                match self.service.finalize(task_id).await {
                    Ok(outcome_id) => {
                        info!(task_id = %task_id, outcome_id, "Final summary complete");
                    }
                    Err(e) => {
                        error!(task_id = %task_id, error = %e, "Final summary failed");
                        if let Err(e) = self.service.fail_finalization(task_id).await {
                            error!(task_id = %task_id, error = %e, "Could not mark parent task failed");
                        }
                    }
                }
            }
            args => self.run_component(args).await,
        }
    }

    async fn run_component(&self, args: &JobArgs) {
        let (Some(component_id), Some(kind)) = (args.component_id(), args.component_kind()) else {
            return;
        };

        self.report(
            component_id,
            ComponentReport::processing(format!("{} in progress...", kind.label())),
        )
        .await;

        let report = match self.analyze(kind, args).await {
            Ok(result) => ComponentReport::completed(result, format!("{} complete.", kind.label())),
            Err(e) => {
                warn!(component_id, kind = %kind, error = %e, "Component analysis failed");
                ComponentReport::failed(format!("{} error: {}", kind.label(), e))
            }
        };

        self.report(component_id, report).await;
    }

    async fn analyze(&self, kind: ComponentKind, args: &JobArgs) -> Result<serde_json::Value, AnalysisError> {
        let analyzer = self.registry.get(kind).ok_or(AnalysisError::NotRegistered(kind))?;
        let value = analyzer.analyze(args).await?;
        normalize_result(kind, value)
    }

    async fn report(&self, component_id: i64, report: ComponentReport) {
        if let Err(e) = self.service.report_component(component_id, report).await {
            error!(component_id, error = %e, "Component status report failed");
        }
    }
}

/// Bounded pool of tokio tasks draining a `ChannelDispatcher`
pub struct WorkerPool {
    handle: JoinHandle<()>,
}

impl WorkerPool {
    /// Start draining `rx`; stops when the channel closes or `cancel` fires
    ///
    /// In-flight jobs finish before `join` returns.
    pub fn spawn(
        mut rx: mpsc::Receiver<QueuedJob>,
        runner: Arc<JobRunner>,
        worker_count: usize,
        cancel: CancellationToken,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let handle = tokio::spawn(async move {
            let slots = Arc::new(Semaphore::new(worker_count));
            info!(worker_count, "Worker pool started");

            loop {
                let job = tokio::select! {
                    _ = cancel.cancelled() => break,
                    job = rx.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                };

                let Ok(permit) = slots.clone().acquire_owned().await else {
                    break;
                };
                let runner = runner.clone();
                tokio::spawn(async move {
                    runner.run(job).await;
                    drop(permit);
                });
            }

            // Wait for in-flight jobs
            let _ = slots.acquire_many(worker_count as u32).await;
            info!("Worker pool stopped");
        });

        Self { handle }
    }

    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!(error = %e, "Worker pool task panicked");
        }
    }
}

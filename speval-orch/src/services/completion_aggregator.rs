//! Completion aggregator
//!
//! Runs on every status query (and optionally after each report). One tick:
//! time out stalled components, pick exactly one branch with `decide`, then
//! perform it. Branches that fan out claim the dispatch marker with a
//! conditional update first, so concurrent ticks dispatch at most once.

use chrono::{DateTime, Utc};
use serde::Serialize;
use speval_common::events::{EvalEvent, EventBus};
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::final_summarizer::FINALIZATION_FAILED_MESSAGE;
use super::{ComponentReport, StageDispatcher, StatusUpdater};
use crate::db;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{ComponentJob, ComponentKind, DispatchMarker, ParentTask, TaskStatus, TranscriptPayload};
use crate::utils::retry_on_lock;

pub const COMPONENT_FAILED_MESSAGE: &str = "One or more evaluation components failed.";
pub const MISSING_TRANSCRIPT_MESSAGE: &str = "Transcription result not found.";
pub const WAVE2_DISPATCHED_MESSAGE: &str = "Text analysis tasks dispatched.";
pub const AGGREGATING_MESSAGE: &str = "All components complete. Aggregating final results...";

/// Progress reported while the summary job runs
pub const AGGREGATING_PROGRESS: i64 = 95;

/// Upper bound of progress derived from component counts
pub const PARTIAL_PROGRESS_CAP: i64 = 90;

/// Branch chosen for one tick, in priority order
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Parent is not PROCESSING
    NoOp,
    /// At least one component failed
    Fail,
    /// Wave 1 completed but the transcription result is unusable
    MissingTranscript,
    DispatchWave2 { transcript: TranscriptPayload, progress: i64 },
    /// Every component completed; summary not yet enqueued
    Finalize,
    /// Every component completed; summary already enqueued
    AwaitingSummary,
    Progress { completed: usize, progress: i64 },
}

/// What a tick did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AggregatorAction {
    Skipped,
    Failed { reason: String },
    Wave2Dispatched { jobs: usize },
    SummaryEnqueued,
    AwaitingSummary,
    Progressed { progress: i64 },
    /// Another evaluator won the dispatch marker
    ClaimLost,
}

/// floor(completed / total × 90)
pub fn partial_progress(completed: usize, total: usize) -> i64 {
    if total == 0 {
        return 0;
    }
    (completed.min(total) as i64 * PARTIAL_PROGRESS_CAP) / total as i64
}

/// Pick the single branch for this snapshot
pub fn decide(task: &ParentTask, components: &[ComponentJob]) -> Decision {
    if task.status != TaskStatus::Processing {
        return Decision::NoOp;
    }

    let total = ComponentKind::COUNT;
    let completed = components.iter().filter(|c| c.status == TaskStatus::Completed).count();
    let failed = components.iter().filter(|c| c.status == TaskStatus::Failed).count();

    if failed > 0 {
        return Decision::Fail;
    }

    let kind_completed = |kind: ComponentKind| components.iter().any(|c| c.kind == kind && c.is_completed());
    let wave1_done = kind_completed(ComponentKind::Transcription) && kind_completed(ComponentKind::AudioFeatures);

    if wave1_done && task.dispatch_marker.is_none() {
        let transcript = components
            .iter()
            .find(|c| c.kind == ComponentKind::Transcription)
            .and_then(ComponentJob::transcript_payload);
        return match transcript {
            Some(transcript) => Decision::DispatchWave2 {
                transcript,
                progress: partial_progress(completed, total),
            },
            None => Decision::MissingTranscript,
        };
    }

    if completed == total {
        return match task.dispatch_marker {
            Some(DispatchMarker::SummaryEnqueued) => Decision::AwaitingSummary,
            _ => Decision::Finalize,
        };
    }

    Decision::Progress {
        completed,
        progress: partial_progress(completed, total),
    }
}

/// True once a parent has sat at `SUMMARY_ENQUEUED` longer than `timeout`
pub fn summary_overdue(task: &ParentTask, now: DateTime<Utc>, timeout: Duration) -> bool {
    if task.dispatch_marker != Some(DispatchMarker::SummaryEnqueued) {
        return false;
    }
    match chrono::Duration::from_std(timeout) {
        Ok(timeout) => now - task.updated_at > timeout,
        Err(_) => false,
    }
}

/// Dispatched, unfinished components with no update for longer than `timeout`
pub fn find_stale_components(components: &[ComponentJob], now: DateTime<Utc>, timeout: Duration) -> Vec<i64> {
    let Ok(timeout) = chrono::Duration::from_std(timeout) else {
        return Vec::new();
    };

    components
        .iter()
        .filter(|c| !c.status.is_terminal())
        .filter_map(|c| {
            let dispatched_at = c.dispatched_at?;
            let last_activity = dispatched_at.max(c.updated_at);
            (now - last_activity > timeout).then_some(c.component_id)
        })
        .collect()
}

#[derive(Clone)]
pub struct CompletionAggregator {
    db: SqlitePool,
    event_bus: EventBus,
    status_updater: StatusUpdater,
    stage_dispatcher: StageDispatcher,
    stale_component_timeout: Option<Duration>,
    max_lock_wait_ms: u64,
}

impl CompletionAggregator {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        status_updater: StatusUpdater,
        stage_dispatcher: StageDispatcher,
        stale_component_timeout: Option<Duration>,
        max_lock_wait_ms: u64,
    ) -> Self {
        Self {
            db,
            event_bus,
            status_updater,
            stage_dispatcher,
            stale_component_timeout,
            max_lock_wait_ms,
        }
    }

    /// Run one evaluation tick for `task_id`
    pub async fn evaluate(&self, task_id: Uuid) -> OrchestratorResult<AggregatorAction> {
        let task = db::get_task(&self.db, task_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("Evaluation task {}", task_id)))?;

        if task.status != TaskStatus::Processing {
            return Ok(AggregatorAction::Skipped);
        }

        let mut components = db::list_components(&self.db, task_id).await?;
        if self.time_out_stale(&components).await? > 0 {
            components = db::list_components(&self.db, task_id).await?;
        }

        match decide(&task, &components) {
            Decision::NoOp => Ok(AggregatorAction::Skipped),
            Decision::Fail => {
                let failed: Vec<_> = components
                    .iter()
                    .filter(|c| c.status == TaskStatus::Failed)
                    .map(|c| c.kind.as_str())
                    .collect();
                info!(task_id = %task_id, failed_components = ?failed, "Component failure detected");
                self.fail_task(task_id, COMPONENT_FAILED_MESSAGE).await
            }
            Decision::MissingTranscript => {
                let err = OrchestratorError::MissingDependency(MISSING_TRANSCRIPT_MESSAGE.to_string());
                warn!(task_id = %task_id, error = %err, "Wave 2 cannot start");
                self.fail_task(task_id, MISSING_TRANSCRIPT_MESSAGE).await
            }
            Decision::DispatchWave2 { transcript, progress } => {
                self.dispatch_wave2(&task, &components, &transcript, progress).await
            }
            Decision::Finalize => self.enqueue_summary(&task).await,
            Decision::AwaitingSummary => self.await_summary(&task).await,
            Decision::Progress { completed, progress } => {
                let message = format!("{}/{} components processed.", completed, ComponentKind::COUNT);
                self.with_retry("update_progress", || {
                    db::parent_tasks::update_progress(&self.db, task_id, progress, &message)
                })
                .await?;
                self.event_bus.emit_lossy(EvalEvent::TaskProgress {
                    task_id: task_id.to_string(),
                    progress,
                    message,
                    timestamp: Utc::now(),
                });
                Ok(AggregatorAction::Progressed { progress })
            }
        }
    }

    async fn time_out_stale(&self, components: &[ComponentJob]) -> OrchestratorResult<usize> {
        let Some(timeout) = self.stale_component_timeout else {
            return Ok(0);
        };

        let stale = find_stale_components(components, Utc::now(), timeout);
        for component_id in &stale {
            warn!(component_id, timeout_secs = timeout.as_secs(), "Component timed out");
            self.status_updater
                .report(
                    *component_id,
                    ComponentReport::failed(format!("Component timed out after {} s without progress", timeout.as_secs())),
                )
                .await?;
        }
        Ok(stale.len())
    }

    async fn dispatch_wave2(
        &self,
        task: &ParentTask,
        components: &[ComponentJob],
        transcript: &TranscriptPayload,
        progress: i64,
    ) -> OrchestratorResult<AggregatorAction> {
        let task_id = task.task_id;
        let claimed = self
            .with_retry("claim_wave2", || {
                db::parent_tasks::claim_dispatch_marker(
                    &self.db,
                    task_id,
                    None,
                    DispatchMarker::Wave2Dispatched,
                    progress,
                    WAVE2_DISPATCHED_MESSAGE,
                )
            })
            .await?;

        if !claimed {
            debug!(task_id = %task_id, "Wave 2 already claimed by another evaluator");
            return Ok(AggregatorAction::ClaimLost);
        }

        match self.stage_dispatcher.dispatch_wave2(task, components, transcript).await {
            Ok(jobs) => {
                self.event_bus.emit_lossy(EvalEvent::Wave2Dispatched {
                    task_id: task_id.to_string(),
                    job_count: jobs,
                    timestamp: Utc::now(),
                });
                Ok(AggregatorAction::Wave2Dispatched { jobs })
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Wave 2 dispatch failed");
                self.fail_task(task_id, &format!("Failed to dispatch text analysis tasks: {}", e))
                    .await
            }
        }
    }

    async fn enqueue_summary(&self, task: &ParentTask) -> OrchestratorResult<AggregatorAction> {
        let task_id = task.task_id;
        let expected = task.dispatch_marker;
        let claimed = self
            .with_retry("claim_summary", || {
                db::parent_tasks::claim_dispatch_marker(
                    &self.db,
                    task_id,
                    expected,
                    DispatchMarker::SummaryEnqueued,
                    AGGREGATING_PROGRESS,
                    AGGREGATING_MESSAGE,
                )
            })
            .await?;

        if !claimed {
            debug!(task_id = %task_id, "Final summary already claimed by another evaluator");
            return Ok(AggregatorAction::ClaimLost);
        }

        match self.stage_dispatcher.enqueue_final_summary(task_id).await {
            Ok(_) => Ok(AggregatorAction::SummaryEnqueued),
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Final summary dispatch failed");
                self.fail_task(task_id, &format!("Failed to dispatch final summary: {}", e))
                    .await
            }
        }
    }

    /// Fail the parent when its summary job never reported back
    async fn await_summary(&self, task: &ParentTask) -> OrchestratorResult<AggregatorAction> {
        let Some(timeout) = self.stale_component_timeout else {
            return Ok(AggregatorAction::AwaitingSummary);
        };
        if !summary_overdue(task, Utc::now(), timeout) {
            return Ok(AggregatorAction::AwaitingSummary);
        }

        warn!(task_id = %task.task_id, timeout_secs = timeout.as_secs(), "Final summary timed out");
        self.fail_task(task.task_id, FINALIZATION_FAILED_MESSAGE).await
    }

    async fn fail_task(&self, task_id: Uuid, reason: &str) -> OrchestratorResult<AggregatorAction> {
        let changed = self
            .with_retry("fail_task", || db::parent_tasks::mark_failed(&self.db, task_id, reason))
            .await?;

        if changed {
            info!(task_id = %task_id, reason, "Evaluation failed");
            self.event_bus.emit_lossy(EvalEvent::TaskFailed {
                task_id: task_id.to_string(),
                error: reason.to_string(),
                timestamp: Utc::now(),
            });
        }

        Ok(AggregatorAction::Failed {
            reason: reason.to_string(),
        })
    }

    async fn with_retry<F, Fut, T>(&self, operation: &str, f: F) -> OrchestratorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = speval_common::Result<T>>,
    {
        Ok(retry_on_lock(operation, self.max_lock_wait_ms, f).await?)
    }
}

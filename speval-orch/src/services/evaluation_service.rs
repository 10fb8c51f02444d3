//! Evaluation service
//!
//! Facade over the pipeline: creation with wave-1 dispatch, status queries that
//! drive the completion aggregator, worker reports, finalization and
//! housekeeping. Shared by the HTTP handlers and the worker pool.

use chrono::{DateTime, Utc};
use serde::Serialize;
use speval_common::events::{EvalEvent, EventBus};
use speval_common::Error;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::final_summarizer::FINALIZATION_FAILED_MESSAGE;
use super::progress_report::REPORT_PERIOD_DAYS;
use super::{
    AggregatorAction, CompletionAggregator, ComponentReport, FinalSummarizer, ProgressReport, ReportOutcome,
    StageDispatcher, StatusUpdater,
};
use crate::config::OrchestratorSettings;
use crate::db;
use crate::dispatch::JobDispatcher;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{ComponentJob, ComponentKind, OutcomeRecord, ParentTask, SubmissionMetadata, TaskStatus};

pub const WAVE1_DISPATCHED_MESSAGE: &str = "Initial audio analysis tasks dispatched.";
pub const INTERRUPTED_MESSAGE: &str = "Evaluation interrupted before dispatch";

/// Latest state of one component as returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
    pub component_id: i64,
    pub component_type: ComponentKind,
    pub status: TaskStatus,
    pub status_message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<ComponentJob> for ComponentStatus {
    fn from(job: ComponentJob) -> Self {
        Self {
            component_id: job.component_id,
            component_type: job.kind,
            status: job.status,
            status_message: job.status_message,
            result: job.result,
            error_message: job.error_message,
            updated_at: job.updated_at,
        }
    }
}

/// Parent status plus every component, taken after an aggregator tick
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub progress: i64,
    pub status_message: Option<String>,
    pub error_message: Option<String>,
    pub outcome_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub components: Vec<ComponentStatus>,
}

impl StatusSnapshot {
    fn new(task: ParentTask, components: Vec<ComponentJob>) -> Self {
        Self {
            task_id: task.task_id,
            status: task.status,
            progress: task.progress,
            status_message: task.status_message,
            error_message: task.error_message,
            outcome_id: task.outcome_id,
            created_at: task.created_at,
            updated_at: task.updated_at,
            completed_at: task.completed_at,
            components: components.into_iter().map(ComponentStatus::from).collect(),
        }
    }
}

pub struct EvaluationService {
    db: SqlitePool,
    event_bus: EventBus,
    stage_dispatcher: StageDispatcher,
    status_updater: StatusUpdater,
    aggregator: CompletionAggregator,
    summarizer: FinalSummarizer,
    evaluate_on_report: bool,
    max_lock_wait_ms: u64,
}

impl EvaluationService {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        dispatcher: Arc<dyn JobDispatcher>,
        settings: &OrchestratorSettings,
        max_lock_wait_ms: u64,
    ) -> Self {
        let stage_dispatcher = StageDispatcher::new(db.clone(), dispatcher, max_lock_wait_ms);
        let status_updater = StatusUpdater::new(db.clone(), event_bus.clone(), max_lock_wait_ms);
        let aggregator = CompletionAggregator::new(
            db.clone(),
            event_bus.clone(),
            status_updater.clone(),
            stage_dispatcher.clone(),
            settings.stale_component_timeout(),
            max_lock_wait_ms,
        );
        let summarizer = FinalSummarizer::new(
            db.clone(),
            event_bus.clone(),
            settings.finalization_policy,
            max_lock_wait_ms,
        );

        Self {
            db,
            event_bus,
            stage_dispatcher,
            status_updater,
            aggregator,
            summarizer,
            evaluate_on_report: settings.evaluate_on_report,
            max_lock_wait_ms,
        }
    }

    pub fn aggregator(&self) -> &CompletionAggregator {
        &self.aggregator
    }

    pub fn summarizer(&self) -> &FinalSummarizer {
        &self.summarizer
    }

    /// Create the parent task and its components, then dispatch wave 1
    ///
    /// If wave 1 cannot be dispatched the parent is left FAILED and the error
    /// is returned.
    pub async fn create_evaluation(&self, owner_id: i64, metadata: SubmissionMetadata) -> OrchestratorResult<ParentTask> {
        metadata.validate().map_err(Error::InvalidInput)?;

        let (task, components) = db::create_task(&self.db, owner_id, metadata, &ComponentKind::ALL).await?;
        let task_id = task.task_id;

        info!(task_id = %task_id, owner_id, "Evaluation created");
        self.event_bus.emit_lossy(EvalEvent::TaskCreated {
            task_id: task_id.to_string(),
            owner_id,
            timestamp: Utc::now(),
        });

        if let Err(e) = self.stage_dispatcher.dispatch_wave1(&task, &components).await {
            warn!(task_id = %task_id, error = %e, "Wave 1 dispatch failed");
            self.fail_created(task_id, &format!("Failed to dispatch initial analysis tasks: {}", e))
                .await?;
            return Err(e);
        }

        let started = crate::utils::retry_on_lock("mark_processing", self.max_lock_wait_ms, || {
            db::parent_tasks::mark_processing(&self.db, task_id, WAVE1_DISPATCHED_MESSAGE)
        })
        .await;
        match started {
            Ok(true) => {}
            Ok(false) => warn!(task_id = %task_id, "Parent was no longer PENDING after wave 1 dispatch"),
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Could not mark evaluation processing");
                self.fail_created(task_id, &format!("Failed to start evaluation: {}", e))
                    .await?;
                return Err(e.into());
            }
        }

        db::get_task(&self.db, task_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("Evaluation task {}", task_id)))
    }

    async fn fail_created(&self, task_id: Uuid, reason: &str) -> OrchestratorResult<()> {
        if db::parent_tasks::mark_failed(&self.db, task_id, reason).await? {
            self.event_bus.emit_lossy(EvalEvent::TaskFailed {
                task_id: task_id.to_string(),
                error: reason.to_string(),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    /// Run an aggregator tick and return the resulting snapshot
    ///
    /// Tasks owned by someone else are reported as not found.
    pub async fn get_status(&self, task_id: Uuid, owner_id: i64) -> OrchestratorResult<StatusSnapshot> {
        if db::get_task_for_owner(&self.db, task_id, owner_id).await?.is_none() {
            return Err(OrchestratorError::NotFound(format!("Evaluation task {}", task_id)));
        }

        let action = self.aggregator.evaluate(task_id).await?;
        if action != AggregatorAction::Skipped {
            tracing::debug!(task_id = %task_id, action = ?action, "Aggregator tick");
        }

        self.snapshot(task_id).await
    }

    /// Current snapshot without an aggregator tick
    pub async fn snapshot(&self, task_id: Uuid) -> OrchestratorResult<StatusSnapshot> {
        let task = db::get_task(&self.db, task_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("Evaluation task {}", task_id)))?;
        let components = db::list_components(&self.db, task_id).await?;
        Ok(StatusSnapshot::new(task, components))
    }

    /// Apply a worker report; with `evaluate_on_report` also schedule an aggregator tick
    ///
    /// The tick runs on its own task and never holds up the caller.
    pub async fn report_component(&self, component_id: i64, report: ComponentReport) -> OrchestratorResult<ReportOutcome> {
        let outcome = self.status_updater.report(component_id, report).await?;

        if self.evaluate_on_report {
            if let ReportOutcome::Applied { parent_task_id, status } = outcome {
                if status.is_terminal() {
                    let aggregator = self.aggregator.clone();
                    tokio::spawn(async move {
                        if let Err(e) = aggregator.evaluate(parent_task_id).await {
                            warn!(task_id = %parent_task_id, error = %e, "Aggregator tick after report failed");
                        }
                    });
                }
            }
        }

        Ok(outcome)
    }

    pub async fn finalize(&self, task_id: Uuid) -> OrchestratorResult<i64> {
        self.summarizer.summarize(task_id).await
    }

    pub async fn fail_finalization(&self, task_id: Uuid) -> OrchestratorResult<bool> {
        self.summarizer.fail_finalization(task_id).await
    }

    pub async fn list_outcomes(&self, owner_id: i64, limit: i64) -> OrchestratorResult<Vec<OutcomeRecord>> {
        Ok(db::list_outcomes_for_owner(&self.db, owner_id, limit.clamp(1, 500)).await?)
    }

    pub async fn get_outcome(&self, outcome_id: i64, owner_id: i64) -> OrchestratorResult<OutcomeRecord> {
        db::get_outcome_for_owner(&self.db, outcome_id, owner_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("Outcome {}", outcome_id)))
    }

    /// Owner's report over the last `REPORT_PERIOD_DAYS` of outcomes
    pub async fn progress_report(&self, owner_id: i64) -> OrchestratorResult<ProgressReport> {
        let now = Utc::now();
        let since = now - chrono::Duration::days(REPORT_PERIOD_DAYS);
        let outcomes = db::list_outcomes_since(&self.db, owner_id, since).await?;
        let report = ProgressReport::build(owner_id, &outcomes, now);
        info!(owner_id, outcomes = report.total_outcomes, "Generated progress report");
        Ok(report)
    }

    /// Fail work an earlier process left behind
    ///
    /// Covers parents still PENDING and parents whose summary job was queued
    /// but never ran, both older than `grace`.
    pub async fn recover_interrupted(&self, grace: Duration) -> OrchestratorResult<u64> {
        let grace = chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = Utc::now() - grace;

        let pending = db::parent_tasks::fail_stale_pending(&self.db, cutoff, INTERRUPTED_MESSAGE).await?;
        if pending > 0 {
            warn!(count = pending, "Failed evaluations interrupted before dispatch");
        }

        let summaries =
            db::parent_tasks::fail_orphaned_summaries(&self.db, cutoff, FINALIZATION_FAILED_MESSAGE).await?;
        if summaries > 0 {
            warn!(count = summaries, "Failed evaluations whose final summary was lost");
        }

        Ok(pending + summaries)
    }

    /// Delete finished parents (and their components) older than `retention`
    pub async fn purge_expired(&self, retention: chrono::Duration) -> OrchestratorResult<u64> {
        let cutoff = Utc::now() - retention;
        let purged = crate::utils::retry_on_lock("purge_expired", self.max_lock_wait_ms, || {
            db::parent_tasks::purge_finished_before(&self.db, cutoff)
        })
        .await?;
        if purged > 0 {
            info!(count = purged, cutoff = %cutoff, "Purged finished evaluation tasks");
        }
        Ok(purged)
    }
}

//! Stage dispatcher
//!
//! Builds the job arguments for each wave and hands them to the dispatcher.
//! It does not decide *when* a wave goes out; the completion aggregator claims
//! the dispatch marker first and only the winner calls `dispatch_wave2`.

use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::db;
use crate::dispatch::JobDispatcher;
use crate::error::OrchestratorResult;
use crate::models::{ComponentJob, ComponentKind, JobArgs, JobHandle, ParentTask, TaskStatus, TranscriptPayload, Wave};
use crate::utils::retry_on_lock;

#[derive(Clone)]
pub struct StageDispatcher {
    db: SqlitePool,
    dispatcher: Arc<dyn JobDispatcher>,
    max_lock_wait_ms: u64,
}

impl StageDispatcher {
    pub fn new(db: SqlitePool, dispatcher: Arc<dyn JobDispatcher>, max_lock_wait_ms: u64) -> Self {
        Self {
            db,
            dispatcher,
            max_lock_wait_ms,
        }
    }

    /// Enqueue transcription and audio feature extraction
    pub async fn dispatch_wave1(&self, task: &ParentTask, components: &[ComponentJob]) -> OrchestratorResult<usize> {
        let jobs = wave1_jobs(task, components);
        self.enqueue_all(task.task_id, jobs, "wave 1").await
    }

    /// Enqueue the transcript-dependent kinds
    pub async fn dispatch_wave2(
        &self,
        task: &ParentTask,
        components: &[ComponentJob],
        transcript: &TranscriptPayload,
    ) -> OrchestratorResult<usize> {
        let jobs = wave2_jobs(task, components, transcript);
        self.enqueue_all(task.task_id, jobs, "wave 2").await
    }

    pub async fn enqueue_final_summary(&self, task_id: Uuid) -> OrchestratorResult<JobHandle> {
        let handle = self
            .dispatcher
            .enqueue(JobArgs::FinalSummary { parent_task_id: task_id })
            .await?;
        tracing::info!(task_id = %task_id, job_id = %handle.job_id, "Final summary enqueued");
        Ok(handle)
    }

    /// `dispatched_at` is stamped before the first enqueue
    async fn enqueue_all(&self, task_id: Uuid, jobs: Vec<JobArgs>, stage: &str) -> OrchestratorResult<usize> {
        let component_ids: Vec<i64> = jobs.iter().filter_map(JobArgs::component_id).collect();
        retry_on_lock("mark_dispatched", self.max_lock_wait_ms, || {
            db::components::mark_dispatched(&self.db, &component_ids)
        })
        .await?;

        let count = jobs.len();
        for job in jobs {
            let handle = self.dispatcher.enqueue(job).await?;
            tracing::debug!(task_id = %task_id, job_id = %handle.job_id, job = %handle.job_name, "Job enqueued");
        }

        tracing::info!(task_id = %task_id, stage, jobs = count, "Stage dispatched");
        Ok(count)
    }
}

/// Wave-1 jobs for components that have not started yet
pub fn wave1_jobs(task: &ParentTask, components: &[ComponentJob]) -> Vec<JobArgs> {
    pending_in_wave(components, Wave::First)
        .filter_map(|component| match component.kind {
            ComponentKind::Transcription => Some(JobArgs::Transcription {
                component_id: component.component_id,
                audio_path: task.metadata.audio_path.clone(),
                parent_task_id: task.task_id,
                question: task.metadata.question.clone(),
                ideal_answer: task.metadata.ideal_answer.clone(),
                model: task.metadata.model.clone(),
            }),
            ComponentKind::AudioFeatures => Some(JobArgs::AudioFeatures {
                component_id: component.component_id,
                audio_path: task.metadata.audio_path.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// Wave-2 jobs, each carrying the transcript plus its kind's extra arguments
pub fn wave2_jobs(task: &ParentTask, components: &[ComponentJob], payload: &TranscriptPayload) -> Vec<JobArgs> {
    let meta = &task.metadata;
    let transcript = &payload.transcript;

    pending_in_wave(components, Wave::Second)
        .map(|component| {
            let component_id = component.component_id;
            match component.kind {
                ComponentKind::Grammar => JobArgs::Grammar {
                    component_id,
                    transcript: transcript.clone(),
                    question: meta.question.clone(),
                    model: meta.model.clone(),
                },
                ComponentKind::ContentComparison => JobArgs::ContentComparison {
                    component_id,
                    transcript: transcript.clone(),
                    ideal_answer: meta.ideal_answer.clone(),
                    question: meta.question.clone(),
                    model: meta.model.clone(),
                },
                ComponentKind::Pronunciation => JobArgs::Pronunciation {
                    component_id,
                    transcript: transcript.clone(),
                    flagged_words: payload.flagged_words.clone(),
                    question: meta.question.clone(),
                    model: meta.model.clone(),
                },
                kind => JobArgs::TextAnalysis {
                    component_id,
                    kind,
                    transcript: transcript.clone(),
                },
            }
        })
        .collect()
}

fn pending_in_wave(components: &[ComponentJob], wave: Wave) -> impl Iterator<Item = &ComponentJob> {
    components
        .iter()
        .filter(move |c| c.kind.wave() == wave && c.status == TaskStatus::Pending)
}

//! Final summarizer
//!
//! Turns completed component results into the immutable outcome record. Runs as
//! a job, so it must tolerate redelivery: a parent already COMPLETED yields its
//! existing outcome id.

use chrono::Utc;
use speval_common::events::{EvalEvent, EventBus};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use super::scoring::{text_field, ComponentResults, ScoreCard};
use crate::config::FinalizationPolicy;
use crate::db;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{ComponentKind, NewOutcome, ParentTask, TaskStatus};
use crate::utils::retry_on_lock;

pub const FINALIZATION_FAILED_MESSAGE: &str = "Failed to create final summary.";

#[derive(Clone)]
pub struct FinalSummarizer {
    db: SqlitePool,
    event_bus: EventBus,
    policy: FinalizationPolicy,
    score_card: ScoreCard,
    max_lock_wait_ms: u64,
}

impl FinalSummarizer {
    pub fn new(db: SqlitePool, event_bus: EventBus, policy: FinalizationPolicy, max_lock_wait_ms: u64) -> Self {
        Self {
            db,
            event_bus,
            policy,
            score_card: ScoreCard::default(),
            max_lock_wait_ms,
        }
    }

    pub fn with_score_card(mut self, score_card: ScoreCard) -> Self {
        self.score_card = score_card;
        self
    }

    /// Persist the outcome record and complete the parent; returns the outcome id
    pub async fn summarize(&self, task_id: Uuid) -> OrchestratorResult<i64> {
        let task = db::get_task(&self.db, task_id)
            .await?
            .ok_or_else(|| OrchestratorError::Finalization(format!("Parent task {} not found", task_id)))?;

        if task.status == TaskStatus::Completed {
            if let Some(outcome_id) = task.outcome_id {
                info!(task_id = %task_id, outcome_id, "Summary redelivered for completed task");
                return Ok(outcome_id);
            }
        }
        if task.status != TaskStatus::Processing {
            return Err(OrchestratorError::Finalization(format!(
                "Parent task {} is {}",
                task_id, task.status
            )));
        }

        let components = db::list_components(&self.db, task_id).await?;
        let results: ComponentResults = components
            .into_iter()
            .filter(|c| c.is_completed())
            .filter_map(|c| Some((c.kind, c.result?)))
            .collect();

        if results.len() < ComponentKind::COUNT {
            match self.policy {
                FinalizationPolicy::Strict => {
                    return Err(OrchestratorError::Finalization(format!(
                        "Only {} of {} components completed",
                        results.len(),
                        ComponentKind::COUNT
                    )));
                }
                FinalizationPolicy::Lenient => {
                    warn!(
                        task_id = %task_id,
                        completed = results.len(),
                        total = ComponentKind::COUNT,
                        "Summarizing with incomplete results"
                    );
                }
            }
        }

        let rating = self.score_card.score(&results);
        let outcome = build_outcome(&task, &results, rating);

        let outcome_id = retry_on_lock("finalize_task", self.max_lock_wait_ms, || {
            db::outcomes::insert_outcome_and_complete(&self.db, &outcome)
        })
        .await
        .map_err(|e| OrchestratorError::Finalization(e.to_string()))?;

        info!(task_id = %task_id, outcome_id, rating, "Outcome record created");
        self.event_bus.emit_lossy(EvalEvent::TaskCompleted {
            task_id: task_id.to_string(),
            outcome_id,
            rating,
            timestamp: Utc::now(),
        });

        Ok(outcome_id)
    }

    /// Mark the parent FAILED after a summarization error
    ///
    /// Returns false if the parent was already terminal.
    pub async fn fail_finalization(&self, task_id: Uuid) -> OrchestratorResult<bool> {
        let changed = retry_on_lock("fail_finalization", self.max_lock_wait_ms, || {
            db::parent_tasks::mark_failed(&self.db, task_id, FINALIZATION_FAILED_MESSAGE)
        })
        .await?;

        if changed {
            self.event_bus.emit_lossy(EvalEvent::TaskFailed {
                task_id: task_id.to_string(),
                error: FINALIZATION_FAILED_MESSAGE.to_string(),
                timestamp: Utc::now(),
            });
        }
        Ok(changed)
    }
}

/// Assemble the outcome fields from the parent and completed results
pub fn build_outcome(task: &ParentTask, results: &ComponentResults, rating: f64) -> NewOutcome {
    let text = |kind: ComponentKind, field: &str| -> Option<String> {
        match results.get(&kind)?.get(field)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(_) => text_field(results, kind, field).map(str::to_string),
            other => Some(other.to_string()),
        }
    };

    NewOutcome {
        parent_task_id: task.task_id,
        owner_id: task.owner_id,
        metadata: task.metadata.clone(),
        transcript: text(ComponentKind::Transcription, "transcript"),
        grammar_feedback: text(ComponentKind::Grammar, "grammar_feedback"),
        pronunciation_feedback: text(ComponentKind::Pronunciation, "pronunciation_feedback"),
        content_evaluation: text(ComponentKind::ContentComparison, "content_evaluation"),
        audio_features: results.get(&ComponentKind::AudioFeatures).cloned(),
        linguistic_features: results.get(&ComponentKind::LinguisticText).cloned(),
        sentiment_analysis: results.get(&ComponentKind::SentimentText).cloned(),
        emotion_analysis: results.get(&ComponentKind::EmotionText).cloned(),
        rating,
    }
}

//! Parent task model
//!
//! One end-to-end evaluation request. Owns one component job per kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::TaskStatus;

/// Default model name forwarded to LLM-backed analyzers
pub const DEFAULT_MODEL: &str = "mistral:latest";

/// Contextual metadata submitted with a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    pub topic: String,
    pub difficulty: String,
    pub question: String,
    pub ideal_answer: String,
    /// Model passed to transcription and LLM-backed text analyzers
    #[serde(default = "default_model")]
    pub model: String,
    /// Location of the uploaded recording, readable by workers
    pub audio_path: String,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl SubmissionMetadata {
    /// Reject submissions workers cannot act on
    pub fn validate(&self) -> Result<(), String> {
        if self.audio_path.trim().is_empty() {
            return Err("audio_path must not be empty".to_string());
        }
        if self.question.trim().is_empty() {
            return Err("question must not be empty".to_string());
        }
        if self.model.trim().is_empty() {
            return Err("model must not be empty".to_string());
        }
        Ok(())
    }
}

/// Persisted guard against re-issuing downstream jobs
///
/// Advances NULL → WAVE2_DISPATCHED → SUMMARY_ENQUEUED, each step claimed by a
/// conditional update so only one evaluator performs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchMarker {
    Wave2Dispatched,
    SummaryEnqueued,
}

impl DispatchMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMarker::Wave2Dispatched => "WAVE2_DISPATCHED",
            DispatchMarker::SummaryEnqueued => "SUMMARY_ENQUEUED",
        }
    }
}

impl fmt::Display for DispatchMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispatchMarker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAVE2_DISPATCHED" => Ok(DispatchMarker::Wave2Dispatched),
            "SUMMARY_ENQUEUED" => Ok(DispatchMarker::SummaryEnqueued),
            other => Err(format!("Unknown dispatch marker: {}", other)),
        }
    }
}

/// Parent task row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentTask {
    pub task_id: Uuid,
    pub owner_id: i64,
    pub status: TaskStatus,
    /// 0-100, non-decreasing while PROCESSING
    pub progress: i64,
    pub status_message: Option<String>,
    pub dispatch_marker: Option<DispatchMarker>,
    pub error_message: Option<String>,
    /// Set once the outcome record exists
    pub outcome_id: Option<i64>,
    pub metadata: SubmissionMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ParentTask {
    /// Fresh PENDING task
    pub fn new(owner_id: i64, metadata: SubmissionMetadata) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4(),
            owner_id,
            status: TaskStatus::Pending,
            progress: 0,
            status_message: Some("Evaluation created.".to_string()),
            dispatch_marker: None,
            error_message: None,
            outcome_id: None,
            metadata,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

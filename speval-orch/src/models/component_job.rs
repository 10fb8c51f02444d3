//! Component job model and the transcription payload contract

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ComponentKind, TaskStatus};

/// One fan-out unit of analysis belonging to a parent task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentJob {
    pub component_id: i64,
    pub parent_task_id: Uuid,
    pub kind: ComponentKind,
    pub status: TaskStatus,
    pub status_message: Option<String>,
    /// Opaque analyzer output, present once COMPLETED
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    /// When a job for this component was last handed to the dispatcher
    pub dispatched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ComponentJob {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Parse the result as a transcription payload
    ///
    /// `None` unless the job completed with a non-empty transcript.
    pub fn transcript_payload(&self) -> Option<TranscriptPayload> {
        if !self.is_completed() {
            return None;
        }
        let payload: TranscriptPayload = serde_json::from_value(self.result.clone()?).ok()?;
        if payload.transcript.trim().is_empty() {
            return None;
        }
        Some(payload)
    }
}

/// Word the recognizer was unsure about, with its confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedWord(pub String, pub f64);

/// Result contract of the transcription component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptPayload {
    pub transcript: String,
    #[serde(default, alias = "flaggedWords")]
    pub flagged_words: Vec<FlaggedWord>,
}

//! Outcome record model
//!
//! Immutable aggregated result of one evaluation. Inserted once, never updated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SubmissionMetadata;

/// Outcome fields assembled by the final summarizer before insertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOutcome {
    pub parent_task_id: Uuid,
    pub owner_id: i64,
    pub metadata: SubmissionMetadata,
    pub transcript: Option<String>,
    pub grammar_feedback: Option<String>,
    pub pronunciation_feedback: Option<String>,
    pub content_evaluation: Option<String>,
    pub audio_features: Option<serde_json::Value>,
    pub linguistic_features: Option<serde_json::Value>,
    pub sentiment_analysis: Option<serde_json::Value>,
    pub emotion_analysis: Option<serde_json::Value>,
    pub rating: f64,
}

/// Persisted outcome row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub outcome_id: i64,
    #[serde(flatten)]
    pub outcome: NewOutcome,
    pub created_at: DateTime<Utc>,
}

//! Shared fixtures

use serde_json::{json, Value};
use speval_common::events::EventBus;
use speval_orch::config::OrchestratorSettings;
use speval_orch::dispatch::JobDispatcher;
use speval_orch::models::SubmissionMetadata;
use speval_orch::services::EvaluationService;
use sqlx::SqlitePool;
use std::sync::Arc;

pub fn sample_metadata() -> SubmissionMetadata {
    SubmissionMetadata {
        topic: "Travel".to_string(),
        difficulty: "intermediate".to_string(),
        question: "Describe a memorable journey.".to_string(),
        ideal_answer: "Last summer I took the night train to Vienna.".to_string(),
        model: "mistral:latest".to_string(),
        audio_path: "/uploads/recording-1.wav".to_string(),
    }
}

pub fn transcript_result() -> Value {
    json!({
        "transcript": "Last summer I took a night train to Vienna",
        "flagged_words": [["Vienna", 0.42]]
    })
}

/// Service with default settings
pub fn build_service(pool: &SqlitePool, dispatcher: Arc<dyn JobDispatcher>) -> EvaluationService {
    build_service_with(pool, dispatcher, OrchestratorSettings::default())
}

pub fn build_service_with(
    pool: &SqlitePool,
    dispatcher: Arc<dyn JobDispatcher>,
    settings: OrchestratorSettings,
) -> EvaluationService {
    EvaluationService::new(pool.clone(), EventBus::new(256), dispatcher, &settings, 5000)
}

//! Analyzers for tests

use async_trait::async_trait;
use serde_json::{json, Value};
use speval_orch::dispatch::{AnalysisError, Analyzer, AnalyzerRegistry};
use speval_orch::models::{ComponentKind, JobArgs};
use std::sync::Arc;

/// Returns a fixed value, or a fixed failure
pub struct StaticAnalyzer {
    response: Result<Value, String>,
}

impl StaticAnalyzer {
    pub fn ok(value: Value) -> Arc<Self> {
        Arc::new(Self { response: Ok(value) })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Err(message.to_string()),
        })
    }
}

#[async_trait]
impl Analyzer for StaticAnalyzer {
    async fn analyze(&self, _args: &JobArgs) -> Result<Value, AnalysisError> {
        self.response.clone().map_err(AnalysisError::Failed)
    }
}

/// Plausible output per kind; feedback kinds answer with bare strings
pub fn canned_result(kind: ComponentKind) -> Value {
    match kind {
        ComponentKind::Transcription => super::transcript_result(),
        ComponentKind::AudioFeatures => json!({"speech_rate": 2.1}),
        ComponentKind::Grammar => json!("Tense usage is consistent."),
        ComponentKind::ContentComparison => json!("Matches the ideal answer closely."),
        ComponentKind::Pronunciation => json!("Vienna was slightly unclear."),
        ComponentKind::LinguisticText => json!({"lexical_diversity": 0.64}),
        ComponentKind::SentimentText => json!({"polarity": "positive"}),
        ComponentKind::EmotionText => json!({"joy": 0.7}),
    }
}

/// A registry answering every kind with `canned_result`
pub fn canned_registry() -> AnalyzerRegistry {
    ComponentKind::ALL
        .into_iter()
        .fold(AnalyzerRegistry::new(), |registry, kind| {
            registry.with(kind, StaticAnalyzer::ok(canned_result(kind)))
        })
}

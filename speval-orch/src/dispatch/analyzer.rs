//! Analysis collaborators
//!
//! Each component kind is served by an injected `Analyzer`. The registry is
//! built once at startup and passed to the worker pool; tests register mocks.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::{ComponentKind, JobArgs, TranscriptPayload};

/// Failure of a single analysis
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No analyzer configured for {0}")]
    NotRegistered(ComponentKind),

    #[error("Analyzer request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Analyzer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid analyzer response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Failed(String),
}

/// Opaque analysis function for one component kind
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, args: &JobArgs) -> Result<Value, AnalysisError>;
}

/// Analyzer lookup by component kind
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    analyzers: HashMap<ComponentKind, Arc<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration; replaces an existing entry for `kind`
    pub fn with(mut self, kind: ComponentKind, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzers.insert(kind, analyzer);
        self
    }

    pub fn register(&mut self, kind: ComponentKind, analyzer: Arc<dyn Analyzer>) {
        self.analyzers.insert(kind, analyzer);
    }

    pub fn get(&self, kind: ComponentKind) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    /// One `HttpAnalyzer` per configured endpoint, sharing a client
    pub fn from_endpoints(endpoints: &BTreeMap<ComponentKind, String>, timeout: Duration) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let mut registry = Self::new();
        for (kind, url) in endpoints {
            registry.register(*kind, Arc::new(HttpAnalyzer::new(client.clone(), url.clone())));
        }
        Ok(registry)
    }
}

/// Analyzer served over HTTP
///
/// POSTs the job arguments as JSON and returns the JSON response body.
pub struct HttpAnalyzer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAnalyzer {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(&self, args: &JobArgs) -> Result<Value, AnalysisError> {
        tracing::debug!(endpoint = %self.endpoint, job = args.job_name(), "Calling analyzer");

        let response = self.client.post(&self.endpoint).json(args).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

/// Bring an analyzer's output into the stored result shape for `kind`
///
/// Feedback kinds may answer with a bare string, which is wrapped under the
/// kind's feedback field. Transcription output must carry a non-empty transcript.
pub fn normalize_result(kind: ComponentKind, value: Value) -> Result<Value, AnalysisError> {
    if kind == ComponentKind::Transcription {
        let payload: TranscriptPayload = serde_json::from_value(value)
            .map_err(|e| AnalysisError::InvalidResponse(format!("transcription payload: {}", e)))?;
        if payload.transcript.trim().is_empty() {
            return Err(AnalysisError::Failed("No speech detected.".to_string()));
        }
        return serde_json::to_value(payload).map_err(|e| AnalysisError::InvalidResponse(e.to_string()));
    }

    match (kind.feedback_field(), value) {
        (Some(field), Value::String(text)) => {
            let mut wrapped = serde_json::Map::new();
            wrapped.insert(field.to_string(), Value::String(text));
            Ok(Value::Object(wrapped))
        }
        (Some(field), Value::Object(map)) if map.contains_key(field) => Ok(Value::Object(map)),
        (Some(field), _) => Err(AnalysisError::InvalidResponse(format!("missing `{}`", field))),
        (None, value) => Ok(value),
    }
}

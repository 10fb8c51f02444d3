//! Job argument schemas
//!
//! Each kind has a fixed argument set. Arguments are serialized as JSON for
//! remote analyzers, tagged by `job`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ComponentKind, FlaggedWord};

/// Arguments of one unit of work handed to the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobArgs {
    Transcription {
        component_id: i64,
        audio_path: String,
        parent_task_id: Uuid,
        question: String,
        ideal_answer: String,
        model: String,
    },
    AudioFeatures {
        component_id: i64,
        audio_path: String,
    },
    /// Emotion, sentiment and linguistic analysis share the transcript-only schema
    TextAnalysis {
        component_id: i64,
        kind: ComponentKind,
        transcript: String,
    },
    Grammar {
        component_id: i64,
        transcript: String,
        question: String,
        model: String,
    },
    ContentComparison {
        component_id: i64,
        transcript: String,
        ideal_answer: String,
        question: String,
        model: String,
    },
    Pronunciation {
        component_id: i64,
        transcript: String,
        flagged_words: Vec<FlaggedWord>,
        question: String,
        model: String,
    },
    FinalSummary {
        parent_task_id: Uuid,
    },
}

impl JobArgs {
    /// Component this job reports to; `None` for the summary job
    pub fn component_id(&self) -> Option<i64> {
        match self {
            JobArgs::Transcription { component_id, .. }
            | JobArgs::AudioFeatures { component_id, .. }
            | JobArgs::TextAnalysis { component_id, .. }
            | JobArgs::Grammar { component_id, .. }
            | JobArgs::ContentComparison { component_id, .. }
            | JobArgs::Pronunciation { component_id, .. } => Some(*component_id),
            JobArgs::FinalSummary { .. } => None,
        }
    }

    pub fn component_kind(&self) -> Option<ComponentKind> {
        match self {
            JobArgs::Transcription { .. } => Some(ComponentKind::Transcription),
            JobArgs::AudioFeatures { .. } => Some(ComponentKind::AudioFeatures),
            JobArgs::TextAnalysis { kind, .. } => Some(*kind),
            JobArgs::Grammar { .. } => Some(ComponentKind::Grammar),
            JobArgs::ContentComparison { .. } => Some(ComponentKind::ContentComparison),
            JobArgs::Pronunciation { .. } => Some(ComponentKind::Pronunciation),
            JobArgs::FinalSummary { .. } => None,
        }
    }

    /// Name used in logs and job handles
    pub fn job_name(&self) -> &'static str {
        match self.component_kind() {
            Some(kind) => kind.as_str(),
            None => "final_summary",
        }
    }
}

/// Receipt returned by a dispatcher for an accepted job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub job_name: String,
}

impl JobHandle {
    pub fn for_job(args: &JobArgs) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            job_name: args.job_name().to_string(),
        }
    }
}

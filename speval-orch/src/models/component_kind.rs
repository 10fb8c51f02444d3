//! Closed enumeration of analysis components
//!
//! Every parent task owns exactly one component job per kind. Wave 1 works on
//! the raw recording; wave 2 needs the transcript produced in wave 1.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Transcription,
    AudioFeatures,
    EmotionText,
    SentimentText,
    LinguisticText,
    Grammar,
    ContentComparison,
    Pronunciation,
}

/// Dependency tier of a component kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wave {
    /// Independent of every other component
    First,
    /// Requires the transcription result
    Second,
}

impl ComponentKind {
    /// Every kind, in creation order
    pub const ALL: [ComponentKind; 8] = [
        ComponentKind::Transcription,
        ComponentKind::AudioFeatures,
        ComponentKind::EmotionText,
        ComponentKind::SentimentText,
        ComponentKind::LinguisticText,
        ComponentKind::Grammar,
        ComponentKind::ContentComparison,
        ComponentKind::Pronunciation,
    ];

    /// Number of components created per parent task
    pub const COUNT: usize = Self::ALL.len();

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Transcription => "transcription",
            ComponentKind::AudioFeatures => "audio_features",
            ComponentKind::EmotionText => "emotion_text",
            ComponentKind::SentimentText => "sentiment_text",
            ComponentKind::LinguisticText => "linguistic_text",
            ComponentKind::Grammar => "grammar",
            ComponentKind::ContentComparison => "content_comparison",
            ComponentKind::Pronunciation => "pronunciation",
        }
    }

    pub fn wave(&self) -> Wave {
        match self {
            ComponentKind::Transcription | ComponentKind::AudioFeatures => Wave::First,
            _ => Wave::Second,
        }
    }

    /// Human-readable label used in component status messages
    pub fn label(&self) -> &'static str {
        match self {
            ComponentKind::Transcription => "Transcription",
            ComponentKind::AudioFeatures => "Audio feature extraction",
            ComponentKind::EmotionText => "Text emotion analysis",
            ComponentKind::SentimentText => "Text sentiment analysis",
            ComponentKind::LinguisticText => "Linguistic feature analysis",
            ComponentKind::Grammar => "Grammar evaluation",
            ComponentKind::ContentComparison => "Content evaluation",
            ComponentKind::Pronunciation => "Pronunciation evaluation",
        }
    }

    /// Key holding the textual feedback in this kind's result payload, if any
    pub fn feedback_field(&self) -> Option<&'static str> {
        match self {
            ComponentKind::Grammar => Some("grammar_feedback"),
            ComponentKind::ContentComparison => Some("content_evaluation"),
            ComponentKind::Pronunciation => Some("pronunciation_feedback"),
            _ => None,
        }
    }

    pub fn wave_members(wave: Wave) -> impl Iterator<Item = ComponentKind> {
        Self::ALL.into_iter().filter(move |k| k.wave() == wave)
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("Unknown component kind: {}", s))
    }
}

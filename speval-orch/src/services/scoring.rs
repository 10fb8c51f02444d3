//! Rating computation
//!
//! Pure and deterministic: the same completed results always give the same
//! rating. Lengths are measured in Unicode scalar values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::ComponentKind;

/// Completed component results keyed by kind
pub type ComponentResults = BTreeMap<ComponentKind, serde_json::Value>;

pub const BASE_SCORE: f64 = 3.0;
pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 5.0;

/// Length condition on a feedback text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Threshold {
    /// Strictly fewer characters than the bound
    Below(usize),
    AtLeast(usize),
}

impl Threshold {
    pub fn matches(&self, len: usize) -> bool {
        match *self {
            Threshold::Below(bound) => len < bound,
            Threshold::AtLeast(bound) => len >= bound,
        }
    }
}

/// Adjustment applied when a component's text field meets a threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRule {
    pub kind: ComponentKind,
    pub field: String,
    pub threshold: Threshold,
    pub adjustment: f64,
}

impl ScoringRule {
    /// Adjustment contributed by this rule; 0 when the field is absent
    pub fn apply(&self, results: &ComponentResults) -> f64 {
        match text_field(results, self.kind, &self.field) {
            Some(text) if self.threshold.matches(text.chars().count()) => self.adjustment,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub base: f64,
    pub rules: Vec<ScoringRule>,
}

impl Default for ScoreCard {
    /// Concise grammar feedback (< 300 chars) and concise content feedback
    /// (< 500 chars) each add a point to the base of 3.0
    fn default() -> Self {
        Self {
            base: BASE_SCORE,
            rules: vec![
                ScoringRule {
                    kind: ComponentKind::Grammar,
                    field: "grammar_feedback".to_string(),
                    threshold: Threshold::Below(300),
                    adjustment: 1.0,
                },
                ScoringRule {
                    kind: ComponentKind::ContentComparison,
                    field: "content_evaluation".to_string(),
                    threshold: Threshold::Below(500),
                    adjustment: 1.0,
                },
            ],
        }
    }
}

impl ScoreCard {
    /// Base plus every firing rule, before clamping
    pub fn raw_score(&self, results: &ComponentResults) -> f64 {
        self.base + self.rules.iter().map(|rule| rule.apply(results)).sum::<f64>()
    }

    pub fn score(&self, results: &ComponentResults) -> f64 {
        finalize_score(self.raw_score(results))
    }
}

/// Clamp to [1.0, 5.0] and round to one decimal place
pub fn finalize_score(raw: f64) -> f64 {
    let clamped = raw.clamp(MIN_SCORE, MAX_SCORE);
    (clamped * 10.0).round() / 10.0
}

/// String value of `field` in the result for `kind`
pub fn text_field<'a>(results: &'a ComponentResults, kind: ComponentKind, field: &str) -> Option<&'a str> {
    results.get(&kind)?.get(field)?.as_str()
}

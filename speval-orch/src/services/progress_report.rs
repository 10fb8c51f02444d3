//! Owner progress report
//!
//! Summarizes an owner's recent outcome records: volume, mean rating overall
//! and per difficulty, and whether the latest ratings trend up or down.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::OutcomeRecord;

/// Days of history a report covers
pub const REPORT_PERIOD_DAYS: i64 = 30;

/// Size of each window compared by the trend
pub const TREND_WINDOW: usize = 10;

/// Minimum difference between window means to count as a trend
pub const TREND_THRESHOLD: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DifficultyStats {
    pub count: usize,
    pub average_rating: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub owner_id: i64,
    pub period_days: i64,
    pub total_outcomes: usize,
    /// None when the period holds no outcomes
    pub average_rating: Option<f64>,
    pub difficulty_breakdown: BTreeMap<String, DifficultyStats>,
    pub improvement_trend: Trend,
    pub generated_at: DateTime<Utc>,
}

impl ProgressReport {
    /// Build a report from outcomes ordered newest first
    pub fn build(owner_id: i64, outcomes: &[OutcomeRecord], generated_at: DateTime<Utc>) -> Self {
        let ratings: Vec<f64> = outcomes.iter().map(|o| o.outcome.rating).collect();

        let mut by_difficulty: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for record in outcomes {
            by_difficulty
                .entry(record.outcome.metadata.difficulty.clone())
                .or_default()
                .push(record.outcome.rating);
        }

        let difficulty_breakdown = by_difficulty
            .into_iter()
            .filter_map(|(difficulty, ratings)| {
                let average_rating = mean(&ratings).map(round2)?;
                Some((
                    difficulty,
                    DifficultyStats {
                        count: ratings.len(),
                        average_rating,
                    },
                ))
            })
            .collect();

        Self {
            owner_id,
            period_days: REPORT_PERIOD_DAYS,
            total_outcomes: outcomes.len(),
            average_rating: mean(&ratings).map(round2),
            difficulty_breakdown,
            improvement_trend: trend(&ratings),
            generated_at,
        }
    }
}

/// Compare the newest window of ratings with the one before it
///
/// `ratings` is newest first. Stable unless both windows are non-empty and
/// their means differ by more than `TREND_THRESHOLD`.
pub fn trend(ratings: &[f64]) -> Trend {
    let recent = &ratings[..ratings.len().min(TREND_WINDOW)];
    let older = ratings
        .get(TREND_WINDOW..ratings.len().min(TREND_WINDOW * 2))
        .unwrap_or(&[]);

    match (mean(recent), mean(older)) {
        (Some(recent), Some(older)) if recent > older + TREND_THRESHOLD => Trend::Improving,
        (Some(recent), Some(older)) if recent < older - TREND_THRESHOLD => Trend::Declining,
        _ => Trend::Stable,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

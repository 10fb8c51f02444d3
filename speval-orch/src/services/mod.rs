//! Orchestration services
//!
//! Leaves first: status updater and scoring, then the stage dispatcher, the
//! completion aggregator, final summarizer and progress report, and the `EvaluationService`
//! facade used by the HTTP layer and the worker pool.

pub mod completion_aggregator;
pub mod evaluation_service;
pub mod final_summarizer;
pub mod progress_report;
pub mod scoring;
pub mod stage_dispatcher;
pub mod status_updater;

pub use completion_aggregator::{decide, AggregatorAction, CompletionAggregator, Decision};
pub use evaluation_service::{ComponentStatus, EvaluationService, StatusSnapshot};
pub use final_summarizer::FinalSummarizer;
pub use progress_report::{DifficultyStats, ProgressReport, Trend};
pub use scoring::{finalize_score, ComponentResults, ScoreCard, ScoringRule, Threshold};
pub use stage_dispatcher::StageDispatcher;
pub use status_updater::{ComponentReport, ReportOutcome, StatusUpdater};

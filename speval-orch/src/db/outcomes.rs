//! Outcome record persistence
//!
//! Outcomes are insert-only. The insert and the parent's COMPLETED transition
//! share one transaction so a parent is COMPLETED iff its outcome exists.

use chrono::{DateTime, Utc};
use speval_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_db_timestamp, parse_json_column, to_db_timestamp};
use crate::models::{NewOutcome, OutcomeRecord, SubmissionMetadata};

const OUTCOME_COLUMNS: &str = r#"
    outcome_id, parent_task_id, owner_id, topic, difficulty, question,
    ideal_answer, model, audio_path, transcript, grammar_feedback,
    pronunciation_feedback, content_evaluation, audio_features,
    linguistic_features, sentiment_analysis, emotion_analysis, rating, created_at
"#;

/// Insert the outcome and mark its parent COMPLETED with progress 100
///
/// Fails (and writes nothing) unless the parent is PROCESSING.
pub async fn insert_outcome_and_complete(pool: &SqlitePool, outcome: &NewOutcome) -> Result<i64> {
    let now = to_db_timestamp(&Utc::now());
    let task_id = outcome.parent_task_id.to_string();
    let json = |v: &Option<serde_json::Value>| v.as_ref().map(serde_json::to_string).transpose();
    let audio_features = json(&outcome.audio_features)?;
    let linguistic_features = json(&outcome.linguistic_features)?;
    let sentiment_analysis = json(&outcome.sentiment_analysis)?;
    let emotion_analysis = json(&outcome.emotion_analysis)?;

    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO evaluation_outcomes (
            parent_task_id, owner_id, topic, difficulty, question, ideal_answer,
            model, audio_path, transcript, grammar_feedback, pronunciation_feedback,
            content_evaluation, audio_features, linguistic_features,
            sentiment_analysis, emotion_analysis, rating, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&task_id)
    .bind(outcome.owner_id)
    .bind(&outcome.metadata.topic)
    .bind(&outcome.metadata.difficulty)
    .bind(&outcome.metadata.question)
    .bind(&outcome.metadata.ideal_answer)
    .bind(&outcome.metadata.model)
    .bind(&outcome.metadata.audio_path)
    .bind(&outcome.transcript)
    .bind(&outcome.grammar_feedback)
    .bind(&outcome.pronunciation_feedback)
    .bind(&outcome.content_evaluation)
    .bind(audio_features)
    .bind(linguistic_features)
    .bind(sentiment_analysis)
    .bind(emotion_analysis)
    .bind(outcome.rating)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    let outcome_id = inserted.last_insert_rowid();

    let completed = sqlx::query(
        r#"
        UPDATE evaluation_tasks
        SET status = 'COMPLETED', progress = 100, outcome_id = ?, status_message = ?,
            updated_at = ?, completed_at = ?
        WHERE task_id = ? AND status = 'PROCESSING'
        "#,
    )
    .bind(outcome_id)
    .bind(format!("Evaluation complete. View results in outcome {}.", outcome_id))
    .bind(&now)
    .bind(&now)
    .bind(&task_id)
    .execute(&mut *tx)
    .await?;

    if completed.rows_affected() != 1 {
        tx.rollback().await?;
        return Err(Error::Internal(format!(
            "Parent task {} is not PROCESSING; outcome not recorded",
            task_id
        )));
    }

    tx.commit().await?;
    Ok(outcome_id)
}

/// Outcome owned by `owner_id`
pub async fn get_outcome_for_owner(pool: &SqlitePool, outcome_id: i64, owner_id: i64) -> Result<Option<OutcomeRecord>> {
    let sql = format!(
        "SELECT {} FROM evaluation_outcomes WHERE outcome_id = ? AND owner_id = ?",
        OUTCOME_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(outcome_id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(outcome_from_row).transpose()
}

pub async fn get_outcome_by_task(pool: &SqlitePool, task_id: Uuid) -> Result<Option<OutcomeRecord>> {
    let sql = format!(
        "SELECT {} FROM evaluation_outcomes WHERE parent_task_id = ?",
        OUTCOME_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(task_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(outcome_from_row).transpose()
}

/// Owner's outcome history, newest first
pub async fn list_outcomes_for_owner(pool: &SqlitePool, owner_id: i64, limit: i64) -> Result<Vec<OutcomeRecord>> {
    let sql = format!(
        "SELECT {} FROM evaluation_outcomes WHERE owner_id = ? ORDER BY created_at DESC, outcome_id DESC LIMIT ?",
        OUTCOME_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(owner_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    rows.iter().map(outcome_from_row).collect()
}

/// Owner's outcomes created at or after `since`, newest first
pub async fn list_outcomes_since(pool: &SqlitePool, owner_id: i64, since: DateTime<Utc>) -> Result<Vec<OutcomeRecord>> {
    let sql = format!(
        "SELECT {} FROM evaluation_outcomes WHERE owner_id = ? AND created_at >= ? ORDER BY created_at DESC, outcome_id DESC",
        OUTCOME_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(owner_id)
        .bind(to_db_timestamp(&since))
        .fetch_all(pool)
        .await?;

    rows.iter().map(outcome_from_row).collect()
}

fn outcome_from_row(row: &SqliteRow) -> Result<OutcomeRecord> {
    let parent_task_id: String = row.get("parent_task_id");
    let parent_task_id = Uuid::parse_str(&parent_task_id)
        .map_err(|e| Error::Internal(format!("Invalid parent_task_id {}: {}", parent_task_id, e)))?;
    let created_at: String = row.get("created_at");

    Ok(OutcomeRecord {
        outcome_id: row.get("outcome_id"),
        outcome: NewOutcome {
            parent_task_id,
            owner_id: row.get("owner_id"),
            metadata: SubmissionMetadata {
                topic: row.get("topic"),
                difficulty: row.get("difficulty"),
                question: row.get("question"),
                ideal_answer: row.get("ideal_answer"),
                model: row.get("model"),
                audio_path: row.get("audio_path"),
            },
            transcript: row.get("transcript"),
            grammar_feedback: row.get("grammar_feedback"),
            pronunciation_feedback: row.get("pronunciation_feedback"),
            content_evaluation: row.get("content_evaluation"),
            audio_features: parse_json_column(row.get("audio_features"), "audio_features")?,
            linguistic_features: parse_json_column(row.get("linguistic_features"), "linguistic_features")?,
            sentiment_analysis: parse_json_column(row.get("sentiment_analysis"), "sentiment_analysis")?,
            emotion_analysis: parse_json_column(row.get("emotion_analysis"), "emotion_analysis")?,
            rating: row.get("rating"),
        },
        created_at: parse_db_timestamp(&created_at, "created_at")?,
    })
}

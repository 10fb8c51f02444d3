//! Parent task persistence
//!
//! Every status transition is a single guarded UPDATE: writes only apply from
//! the expected source state, so a terminal parent is never reopened and two
//! evaluators cannot both win the same transition.

use chrono::{DateTime, Utc};
use speval_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

use super::{parse_db_timestamp, parse_optional_timestamp, parse_text_column, to_db_timestamp};
use crate::models::{ComponentJob, ComponentKind, DispatchMarker, ParentTask, SubmissionMetadata, TaskStatus};

const TASK_COLUMNS: &str = r#"
    task_id, owner_id, status, progress, status_message, dispatch_marker,
    error_message, outcome_id, topic, difficulty, question, ideal_answer,
    model, audio_path, created_at, updated_at, completed_at
"#;

/// Insert a PENDING parent task and one PENDING component per kind
///
/// Runs in one transaction: either all rows exist afterwards or none do.
pub async fn create_task(
    pool: &SqlitePool,
    owner_id: i64,
    metadata: SubmissionMetadata,
    kinds: &[ComponentKind],
) -> Result<(ParentTask, Vec<ComponentJob>)> {
    let mut seen = HashSet::new();
    if let Some(dup) = kinds.iter().find(|k| !seen.insert(**k)) {
        return Err(Error::InvalidInput(format!("Duplicate component kind: {}", dup)));
    }
    if kinds.is_empty() {
        return Err(Error::InvalidInput("At least one component kind is required".to_string()));
    }

    let task = ParentTask::new(owner_id, metadata);
    let task_id = task.task_id.to_string();
    let now = to_db_timestamp(&task.created_at);

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO evaluation_tasks (
            task_id, owner_id, status, progress, status_message,
            topic, difficulty, question, ideal_answer, model, audio_path,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&task_id)
    .bind(task.owner_id)
    .bind(task.status.as_str())
    .bind(task.progress)
    .bind(&task.status_message)
    .bind(&task.metadata.topic)
    .bind(&task.metadata.difficulty)
    .bind(&task.metadata.question)
    .bind(&task.metadata.ideal_answer)
    .bind(&task.metadata.model)
    .bind(&task.metadata.audio_path)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    let mut components = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let inserted = sqlx::query(
            r#"
            INSERT INTO evaluation_components (
                parent_task_id, component_kind, status, status_message, created_at, updated_at
            ) VALUES (?, ?, 'PENDING', ?, ?, ?)
            "#,
        )
        .bind(&task_id)
        .bind(kind.as_str())
        .bind("Queued.")
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        components.push(ComponentJob {
            component_id: inserted.last_insert_rowid(),
            parent_task_id: task.task_id,
            kind: *kind,
            status: TaskStatus::Pending,
            status_message: Some("Queued.".to_string()),
            result: None,
            error_message: None,
            dispatched_at: None,
            created_at: task.created_at,
            updated_at: task.created_at,
            completed_at: None,
        });
    }

    tx.commit().await?;

    tracing::debug!(
        task_id = %task.task_id,
        owner_id,
        components = components.len(),
        "Parent task and component rows created"
    );

    Ok((task, components))
}

/// Load a parent task by id
pub async fn get_task(pool: &SqlitePool, task_id: Uuid) -> Result<Option<ParentTask>> {
    let sql = format!("SELECT {} FROM evaluation_tasks WHERE task_id = ?", TASK_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(task_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(task_from_row).transpose()
}

/// Load a parent task only if it belongs to `owner_id`
pub async fn get_task_for_owner(pool: &SqlitePool, task_id: Uuid, owner_id: i64) -> Result<Option<ParentTask>> {
    let sql = format!(
        "SELECT {} FROM evaluation_tasks WHERE task_id = ? AND owner_id = ?",
        TASK_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(task_id.to_string())
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(task_from_row).transpose()
}

/// PENDING → PROCESSING after wave 1 has been handed off
pub async fn mark_processing(pool: &SqlitePool, task_id: Uuid, message: &str) -> Result<bool> {
    let now = to_db_timestamp(&Utc::now());
    let result = sqlx::query(
        r#"
        UPDATE evaluation_tasks
        SET status = 'PROCESSING', status_message = ?, updated_at = ?
        WHERE task_id = ? AND status = 'PENDING'
        "#,
    )
    .bind(message)
    .bind(&now)
    .bind(task_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Non-terminal → FAILED
///
/// Returns false when the parent was already terminal (or missing).
pub async fn mark_failed(pool: &SqlitePool, task_id: Uuid, error_message: &str) -> Result<bool> {
    let now = to_db_timestamp(&Utc::now());
    let result = sqlx::query(
        r#"
        UPDATE evaluation_tasks
        SET status = 'FAILED', status_message = ?, error_message = ?,
            updated_at = ?, completed_at = ?
        WHERE task_id = ? AND status IN ('PENDING', 'PROCESSING')
        "#,
    )
    .bind(error_message)
    .bind(error_message)
    .bind(&now)
    .bind(&now)
    .bind(task_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Raise progress (never lowers it) and replace the status message
pub async fn update_progress(pool: &SqlitePool, task_id: Uuid, progress: i64, message: &str) -> Result<bool> {
    let now = to_db_timestamp(&Utc::now());
    let result = sqlx::query(
        r#"
        UPDATE evaluation_tasks
        SET progress = MAX(progress, ?), status_message = ?, updated_at = ?
        WHERE task_id = ? AND status = 'PROCESSING'
        "#,
    )
    .bind(progress.clamp(0, 100))
    .bind(message)
    .bind(&now)
    .bind(task_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Atomically advance the dispatch marker from `expected` to `next`
///
/// Progress and status message are written in the same statement. Returns true
/// only for the single caller whose update matched; every concurrent caller
/// observing the same `expected` value gets false.
pub async fn claim_dispatch_marker(
    pool: &SqlitePool,
    task_id: Uuid,
    expected: Option<DispatchMarker>,
    next: DispatchMarker,
    progress: i64,
    message: &str,
) -> Result<bool> {
    let now = to_db_timestamp(&Utc::now());
    let result = sqlx::query(
        r#"
        UPDATE evaluation_tasks
        SET dispatch_marker = ?, progress = MAX(progress, ?), status_message = ?, updated_at = ?
        WHERE task_id = ? AND status = 'PROCESSING' AND dispatch_marker IS ?
        "#,
    )
    .bind(next.as_str())
    .bind(progress.clamp(0, 100))
    .bind(message)
    .bind(&now)
    .bind(task_id.to_string())
    .bind(expected.map(|m| m.as_str()))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Fail parents still PENDING that were created before `created_before`
///
/// A PENDING parent that old never had wave 1 dispatched (the process stopped
/// between creation and dispatch).
pub async fn fail_stale_pending(pool: &SqlitePool, created_before: DateTime<Utc>, error_message: &str) -> Result<u64> {
    let now = to_db_timestamp(&Utc::now());
    let result = sqlx::query(
        r#"
        UPDATE evaluation_tasks
        SET status = 'FAILED', status_message = ?, error_message = ?,
            updated_at = ?, completed_at = ?
        WHERE status = 'PENDING' AND created_at < ?
        "#,
    )
    .bind(error_message)
    .bind(error_message)
    .bind(&now)
    .bind(&now)
    .bind(to_db_timestamp(&created_before))
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Fail PROCESSING parents whose summary was enqueued before `updated_before`
///
/// The job queue lives in process memory, so a summary claimed by an earlier
/// process never runs.
pub async fn fail_orphaned_summaries(
    pool: &SqlitePool,
    updated_before: DateTime<Utc>,
    error_message: &str,
) -> Result<u64> {
    let now = to_db_timestamp(&Utc::now());
    let result = sqlx::query(
        r#"
        UPDATE evaluation_tasks
        SET status = 'FAILED', status_message = ?, error_message = ?,
            updated_at = ?, completed_at = ?
        WHERE status = 'PROCESSING' AND dispatch_marker = ? AND updated_at < ?
        "#,
    )
    .bind(error_message)
    .bind(error_message)
    .bind(&now)
    .bind(&now)
    .bind(DispatchMarker::SummaryEnqueued.as_str())
    .bind(to_db_timestamp(&updated_before))
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Delete terminal parents created before `cutoff`, with their components
///
/// Outcome records are kept. Returns the number of parents removed.
pub async fn purge_finished_before(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let cutoff = to_db_timestamp(&cutoff);
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        DELETE FROM evaluation_components
        WHERE parent_task_id IN (
            SELECT task_id FROM evaluation_tasks
            WHERE status IN ('COMPLETED', 'FAILED') AND created_at < ?
        )
        "#,
    )
    .bind(&cutoff)
    .execute(&mut *tx)
    .await?;

    let removed = sqlx::query(
        "DELETE FROM evaluation_tasks WHERE status IN ('COMPLETED', 'FAILED') AND created_at < ?",
    )
    .bind(&cutoff)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(removed.rows_affected())
}

fn task_from_row(row: &SqliteRow) -> Result<ParentTask> {
    let task_id: String = row.get("task_id");
    let task_id = Uuid::parse_str(&task_id)
        .map_err(|e| Error::Internal(format!("Invalid task_id {}: {}", task_id, e)))?;

    let status: String = row.get("status");
    let marker: Option<String> = row.get("dispatch_marker");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(ParentTask {
        task_id,
        owner_id: row.get("owner_id"),
        status: parse_text_column(&status, "status")?,
        progress: row.get("progress"),
        status_message: row.get("status_message"),
        dispatch_marker: marker
            .as_deref()
            .map(|m| parse_text_column(m, "dispatch_marker"))
            .transpose()?,
        error_message: row.get("error_message"),
        outcome_id: row.get("outcome_id"),
        metadata: SubmissionMetadata {
            topic: row.get("topic"),
            difficulty: row.get("difficulty"),
            question: row.get("question"),
            ideal_answer: row.get("ideal_answer"),
            model: row.get("model"),
            audio_path: row.get("audio_path"),
        },
        created_at: parse_db_timestamp(&created_at, "created_at")?,
        updated_at: parse_db_timestamp(&updated_at, "updated_at")?,
        completed_at: parse_optional_timestamp(row.get("completed_at"), "completed_at")?,
    })
}

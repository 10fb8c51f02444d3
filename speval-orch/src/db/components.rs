//! Component job persistence
//!
//! `write_component_status` is the only statement that changes a component's
//! status, result or error. It refuses to touch a terminal row.

use chrono::Utc;
use speval_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_db_timestamp, parse_json_column, parse_optional_timestamp, parse_text_column, to_db_timestamp};
use crate::models::{ComponentJob, TaskStatus};

const COMPONENT_COLUMNS: &str = r#"
    component_id, parent_task_id, component_kind, status, status_message,
    result, error_message, dispatched_at, created_at, updated_at, completed_at
"#;

/// All components of a parent task, in creation order
pub async fn list_components(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<ComponentJob>> {
    let sql = format!(
        "SELECT {} FROM evaluation_components WHERE parent_task_id = ? ORDER BY component_id",
        COMPONENT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(task_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter().map(component_from_row).collect()
}

pub async fn get_component(pool: &SqlitePool, component_id: i64) -> Result<Option<ComponentJob>> {
    let sql = format!(
        "SELECT {} FROM evaluation_components WHERE component_id = ?",
        COMPONENT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(component_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(component_from_row).transpose()
}

/// Write status, message, result and error together
///
/// Absent message/result/error keep their stored values. `completed_at` is set
/// when `status` is terminal. Returns false when the row is missing or already
/// terminal; the row is then left untouched.
pub async fn write_component_status(
    pool: &SqlitePool,
    component_id: i64,
    status: TaskStatus,
    message: Option<&str>,
    result: Option<&serde_json::Value>,
    error: Option<&str>,
) -> Result<bool> {
    let now = to_db_timestamp(&Utc::now());
    let completed_at = status.is_terminal().then(|| now.clone());
    let result_json = result.map(serde_json::to_string).transpose()?;

    let updated = sqlx::query(
        r#"
        UPDATE evaluation_components
        SET status = ?,
            status_message = COALESCE(?, status_message),
            result = COALESCE(?, result),
            error_message = COALESCE(?, error_message),
            updated_at = ?,
            completed_at = COALESCE(?, completed_at)
        WHERE component_id = ? AND status NOT IN ('COMPLETED', 'FAILED')
        "#,
    )
    .bind(status.as_str())
    .bind(message)
    .bind(result_json)
    .bind(error)
    .bind(&now)
    .bind(completed_at)
    .bind(component_id)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() == 1)
}

/// Stamp `dispatched_at` on components just handed to the dispatcher
pub async fn mark_dispatched(pool: &SqlitePool, component_ids: &[i64]) -> Result<()> {
    if component_ids.is_empty() {
        return Ok(());
    }

    let now = to_db_timestamp(&Utc::now());
    let mut tx = pool.begin().await?;
    for component_id in component_ids {
        sqlx::query(
            r#"
            UPDATE evaluation_components
            SET dispatched_at = ?
            WHERE component_id = ? AND status NOT IN ('COMPLETED', 'FAILED')
            "#,
        )
        .bind(&now)
        .bind(*component_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

fn component_from_row(row: &SqliteRow) -> Result<ComponentJob> {
    let parent_task_id: String = row.get("parent_task_id");
    let parent_task_id = Uuid::parse_str(&parent_task_id)
        .map_err(|e| Error::Internal(format!("Invalid parent_task_id {}: {}", parent_task_id, e)))?;

    let kind: String = row.get("component_kind");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(ComponentJob {
        component_id: row.get("component_id"),
        parent_task_id,
        kind: parse_text_column(&kind, "component_kind")?,
        status: parse_text_column(&status, "status")?,
        status_message: row.get("status_message"),
        result: parse_json_column(row.get("result"), "result")?,
        error_message: row.get("error_message"),
        dispatched_at: parse_optional_timestamp(row.get("dispatched_at"), "dispatched_at")?,
        created_at: parse_db_timestamp(&created_at, "created_at")?,
        updated_at: parse_db_timestamp(&updated_at, "updated_at")?,
        completed_at: parse_optional_timestamp(row.get("completed_at"), "completed_at")?,
    })
}

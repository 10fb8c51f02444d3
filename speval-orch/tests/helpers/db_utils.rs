//! Database Test Utilities

use anyhow::Result;
use serde_json::Value;
use speval_common::config::DatabaseConfig;
use speval_orch::db;
use speval_orch::models::{ComponentJob, ComponentKind, DispatchMarker, ParentTask, TaskStatus};
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

use super::fixtures::sample_metadata;

/// Create temporary file-backed test database with tables initialized
///
/// A file (not `:memory:`) so every pooled connection sees the same database.
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_speval.db");
    let pool = db::init_database_pool(&db_path, &DatabaseConfig::default()).await?;
    Ok((temp_dir, pool))
}

/// Insert a parent with all components and move it to PROCESSING, without dispatching
pub async fn seed_processing_task(pool: &SqlitePool, owner_id: i64) -> (ParentTask, Vec<ComponentJob>) {
    let (task, components) = db::create_task(pool, owner_id, sample_metadata(), &ComponentKind::ALL)
        .await
        .unwrap();
    assert!(db::parent_tasks::mark_processing(pool, task.task_id, "test").await.unwrap());
    let task = db::get_task(pool, task.task_id).await.unwrap().unwrap();
    (task, components)
}

fn find(components: &[ComponentJob], kind: ComponentKind) -> i64 {
    components
        .iter()
        .find(|c| c.kind == kind)
        .map(|c| c.component_id)
        .unwrap()
}

/// Write COMPLETED with `result` straight to the row
pub async fn complete_component(pool: &SqlitePool, components: &[ComponentJob], kind: ComponentKind, result: Value) {
    let id = find(components, kind);
    let applied = db::components::write_component_status(pool, id, TaskStatus::Completed, Some("done"), Some(&result), None)
        .await
        .unwrap();
    assert!(applied, "component {} was already terminal", kind);
}

pub async fn fail_component(pool: &SqlitePool, components: &[ComponentJob], kind: ComponentKind, error: &str) {
    let id = find(components, kind);
    db::components::write_component_status(pool, id, TaskStatus::Failed, None, None, Some(error))
        .await
        .unwrap();
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Move the parent's `updated_at` `seconds` into the past
pub async fn backdate_task(pool: &SqlitePool, task_id: Uuid, seconds: i64) {
    let old = (chrono::Utc::now() - chrono::Duration::seconds(seconds))
        .to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
    sqlx::query("UPDATE evaluation_tasks SET updated_at = ? WHERE task_id = ?")
        .bind(&old)
        .bind(task_id.to_string())
        .execute(pool)
        .await
        .unwrap();
}

/// Drive a seeded parent to SUMMARY_ENQUEUED at 95 with every component COMPLETED
pub async fn seed_awaiting_summary(pool: &SqlitePool, owner_id: i64) -> ParentTask {
    let (task, components) = seed_processing_task(pool, owner_id).await;
    for kind in ComponentKind::ALL {
        let result = match kind {
            ComponentKind::Transcription => serde_json::json!({"transcript": "hello", "flagged_words": []}),
            _ => serde_json::json!({}),
        };
        complete_component(pool, &components, kind, result).await;
    }
    let claimed = db::parent_tasks::claim_dispatch_marker(
        pool,
        task.task_id,
        None,
        DispatchMarker::SummaryEnqueued,
        95,
        "All components complete. Aggregating final results...",
    )
    .await
    .unwrap();
    assert!(claimed);
    db::get_task(pool, task.task_id).await.unwrap().unwrap()
}

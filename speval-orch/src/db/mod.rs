//! Component record store
//!
//! Typed accessors over the `evaluation_tasks`, `evaluation_components` and
//! `evaluation_outcomes` tables. Timestamps are stored as RFC 3339 UTC text with
//! a fixed precision so they compare correctly as strings.

pub mod components;
pub mod outcomes;
pub mod parent_tasks;

pub use components::{get_component, list_components};
pub use outcomes::{get_outcome_for_owner, list_outcomes_for_owner, list_outcomes_since};
pub use parent_tasks::{create_task, get_task, get_task_for_owner};

use chrono::{DateTime, SecondsFormat, Utc};
use speval_common::config::DatabaseConfig;
use speval_common::{Error, Result};
use sqlx::SqlitePool;
use std::path::Path;

/// Open the database file and make sure the schema exists
pub async fn init_database_pool(db_path: &Path, config: &DatabaseConfig) -> Result<SqlitePool> {
    let pool = speval_common::db::create_pool(db_path, config).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create orchestrator tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evaluation_tasks (
            task_id TEXT PRIMARY KEY,
            owner_id INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING'
                CHECK (status IN ('PENDING', 'PROCESSING', 'COMPLETED', 'FAILED')),
            progress INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
            status_message TEXT,
            dispatch_marker TEXT,
            error_message TEXT,
            outcome_id INTEGER,
            topic TEXT NOT NULL,
            difficulty TEXT NOT NULL,
            question TEXT NOT NULL,
            ideal_answer TEXT NOT NULL,
            model TEXT NOT NULL,
            audio_path TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_evaluation_tasks_owner ON evaluation_tasks(owner_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evaluation_components (
            component_id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_task_id TEXT NOT NULL,
            component_kind TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING'
                CHECK (status IN ('PENDING', 'PROCESSING', 'COMPLETED', 'FAILED')),
            status_message TEXT,
            result TEXT,
            error_message TEXT,
            dispatched_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            completed_at TEXT,
            UNIQUE (parent_task_id, component_kind)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evaluation_outcomes (
            outcome_id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_task_id TEXT NOT NULL UNIQUE,
            owner_id INTEGER NOT NULL,
            topic TEXT NOT NULL,
            difficulty TEXT NOT NULL,
            question TEXT NOT NULL,
            ideal_answer TEXT NOT NULL,
            model TEXT NOT NULL,
            audio_path TEXT NOT NULL,
            transcript TEXT,
            grammar_feedback TEXT,
            pronunciation_feedback TEXT,
            content_evaluation TEXT,
            audio_features TEXT,
            linguistic_features TEXT,
            sentiment_analysis TEXT,
            emotion_analysis TEXT,
            rating REAL NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_evaluation_outcomes_owner ON evaluation_outcomes(owner_id, created_at)",
    )
    .execute(pool)
    .await?;

    tracing::debug!("Orchestrator tables initialized");
    Ok(())
}

/// Canonical text form of a timestamp column
pub(crate) fn to_db_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_db_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

pub(crate) fn parse_optional_timestamp(value: Option<String>, column: &str) -> Result<Option<DateTime<Utc>>> {
    value.map(|s| parse_db_timestamp(&s, column)).transpose()
}

pub(crate) fn parse_json_column(value: Option<String>, column: &str) -> Result<Option<serde_json::Value>> {
    value
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", column, e)))
}

pub(crate) fn parse_text_column<T>(value: &str, column: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid {}: {}", column, e)))
}

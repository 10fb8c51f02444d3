//! SQLite pool construction
//!
//! Every connection gets the same per-connection PRAGMAs: busy_timeout, WAL
//! journal, NORMAL synchronous. WAL lets status queries read while workers write.

use crate::config::DatabaseConfig;
use crate::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;

/// Open (creating if needed) the database file with the configured pool settings
pub async fn create_pool(db_path: &Path, config: &DatabaseConfig) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::debug!(
        "Creating database pool: {} connections, busy_timeout={}ms",
        config.pool_size,
        config.busy_timeout_ms
    );

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.pool_size.max(1))
        .acquire_timeout(Duration::from_millis(config.max_lock_wait_ms.max(1)))
        .connect_with(options)
        .await
        .map_err(Error::Database)?;

    tracing::info!(
        path = %db_path.display(),
        "Database pool ready: {} connections, busy_timeout={}ms",
        config.pool_size,
        config.busy_timeout_ms
    );

    Ok(pool)
}

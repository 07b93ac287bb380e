//! Database pool construction and schema bootstrap.

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Opens (creating if missing) the engine database at `path`.
pub async fn create_pool(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
        .map_err(|e| crate::error::StoreError::Database(e.to_string()))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    initialize_schema(&pool).await?;
    Ok(pool)
}

/// In-memory pool for tests.
pub async fn create_test_pool() -> Result<SqlitePool> {
    let pool = SqlitePool::connect(":memory:").await?;
    initialize_schema(&pool).await?;
    Ok(pool)
}

/// Creates all tables and indexes if they do not exist.
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS folder_cache (
            folder_id TEXT PRIMARY KEY,
            children TEXT NOT NULL,
            subfolder_ids TEXT,
            summary TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            target TEXT NOT NULL,
            status TEXT NOT NULL,
            ctime INTEGER NOT NULL,
            ftime INTEGER,
            UNIQUE(source, target)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_mapping (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL,
            source_id TEXT NOT NULL,
            dest_id TEXT NOT NULL,
            UNIQUE(task_id, source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS copied (
            task_id INTEGER NOT NULL,
            file_id TEXT NOT NULL,
            PRIMARY KEY (task_id, file_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS hash_index (
            file_id TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'normal'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_hash_index_hash ON hash_index(content_hash, status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Current timestamp in milliseconds, the row-timestamp convention across
/// the stores.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

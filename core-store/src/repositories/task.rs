//! Task store: durable copy-task records and their append-only logs.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

use crate::db::now_millis;
use crate::error::{Result, StoreError};
use crate::models::{CopyTask, MappingEntry, TaskStatus};

/// Durable record of copy operations.
///
/// The id-mapping and completed-file logs are append-only with idempotent
/// appends: re-appending an existing `(task, source)` pair is a no-op, so a
/// resumed run can safely replay work. Entries are never mutated, only the
/// task row's status field is.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Creates a task in `Copying` state. Fails if a task for the pair
    /// already exists.
    async fn create(&self, source: &str, target: &str) -> Result<CopyTask>;

    async fn find_by_pair(&self, source: &str, target: &str) -> Result<Option<CopyTask>>;

    async fn get(&self, task_id: i64) -> Result<Option<CopyTask>>;

    async fn set_status(&self, task_id: i64, status: TaskStatus) -> Result<()>;

    /// Marks the task finished and stamps its completion time.
    async fn mark_finished(&self, task_id: i64) -> Result<()>;

    /// Appends one id-mapping entry. Idempotent per `(task_id, source_id)`.
    async fn append_mapping(&self, task_id: i64, source_id: &str, dest_id: &str) -> Result<()>;

    /// The task's mapping log in append order (first entry is the root).
    async fn mapping(&self, task_id: i64) -> Result<Vec<MappingEntry>>;

    /// Discards the mapping log (restart).
    async fn clear_mapping(&self, task_id: i64) -> Result<()>;

    /// Records a file as copied. Idempotent per `(task_id, file_id)`.
    async fn append_completed(&self, task_id: i64, file_id: &str) -> Result<()>;

    async fn completed(&self, task_id: i64) -> Result<Vec<String>>;

    /// Discards the completed-file log (restart).
    async fn clear_completed(&self, task_id: i64) -> Result<()>;

    /// Flips every `Copying` task to `Interrupted`; returns how many were
    /// flipped. Called from the process shutdown hook so state never claims
    /// "in progress" across a restart.
    async fn interrupt_active(&self) -> Result<u64>;
}

/// SQLite implementation of [`TaskStore`].
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<CopyTask> {
        let status: String = row.get("status");
        Ok(CopyTask {
            id: row.get("id"),
            source_id: row.get("source"),
            target_id: row.get("target"),
            status: TaskStatus::from_str(&status)?,
            ctime: row.get("ctime"),
            ftime: row.get("ftime"),
        })
    }
}

#[async_trait]
impl TaskStore for SqliteTaskRepository {
    async fn create(&self, source: &str, target: &str) -> Result<CopyTask> {
        let ctime = now_millis();
        let result = sqlx::query(
            "INSERT INTO task (source, target, status, ctime) VALUES (?, ?, ?, ?)",
        )
        .bind(source)
        .bind(target)
        .bind(TaskStatus::Copying.as_str())
        .bind(ctime)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        info!(task_id = id, source, target, "Created copy task");

        Ok(CopyTask {
            id,
            source_id: source.to_string(),
            target_id: target.to_string(),
            status: TaskStatus::Copying,
            ctime,
            ftime: None,
        })
    }

    async fn find_by_pair(&self, source: &str, target: &str) -> Result<Option<CopyTask>> {
        let row = sqlx::query(
            "SELECT id, source, target, status, ctime, ftime FROM task \
             WHERE source = ? AND target = ?",
        )
        .bind(source)
        .bind(target)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn get(&self, task_id: i64) -> Result<Option<CopyTask>> {
        let row = sqlx::query(
            "SELECT id, source, target, status, ctime, ftime FROM task WHERE id = ?",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn set_status(&self, task_id: i64, status: TaskStatus) -> Result<()> {
        let affected = sqlx::query("UPDATE task SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(task_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StoreError::TaskNotFound { task_id });
        }
        Ok(())
    }

    async fn mark_finished(&self, task_id: i64) -> Result<()> {
        let affected = sqlx::query("UPDATE task SET status = ?, ftime = ? WHERE id = ?")
            .bind(TaskStatus::Finished.as_str())
            .bind(now_millis())
            .bind(task_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StoreError::TaskNotFound { task_id });
        }
        Ok(())
    }

    async fn append_mapping(&self, task_id: i64, source_id: &str, dest_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO task_mapping (task_id, source_id, dest_id) VALUES (?, ?, ?)",
        )
        .bind(task_id)
        .bind(source_id)
        .bind(dest_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mapping(&self, task_id: i64) -> Result<Vec<MappingEntry>> {
        let rows = sqlx::query(
            "SELECT seq, source_id, dest_id FROM task_mapping WHERE task_id = ? ORDER BY seq ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| MappingEntry {
                seq: row.get("seq"),
                source_id: row.get("source_id"),
                dest_id: row.get("dest_id"),
            })
            .collect())
    }

    async fn clear_mapping(&self, task_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM task_mapping WHERE task_id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_completed(&self, task_id: i64, file_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO copied (task_id, file_id) VALUES (?, ?)")
            .bind(task_id)
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn completed(&self, task_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT file_id FROM copied WHERE task_id = ?")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("file_id")).collect())
    }

    async fn clear_completed(&self, task_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM copied WHERE task_id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn interrupt_active(&self) -> Result<u64> {
        let affected = sqlx::query("UPDATE task SET status = ? WHERE status = ?")
            .bind(TaskStatus::Interrupted.as_str())
            .bind(TaskStatus::Copying.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected > 0 {
            info!(tasks = affected, "Marked in-flight copy tasks as interrupted");
        }
        Ok(affected)
    }
}

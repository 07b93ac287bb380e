//! Checkpoint store: the per-folder listing cache.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::VecDeque;
use tracing::debug;

use crate::db::now_millis;
use crate::error::Result;
use crate::models::{FolderRecord, Node};

/// Durable per-folder cache of children, subfolder ids, and the aggregated
/// subtree summary.
///
/// Writers only ever record complete listings, so the presence of a row is
/// itself the "fully listed" marker. Concurrent upserts of the same folder
/// are last-write-wins at the row level, which is safe because any complete
/// listing is a valid value.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, folder_id: &str) -> Result<Option<FolderRecord>>;

    /// Writes (or replaces) a folder's complete listing. An existing summary
    /// is preserved; summaries have their own setters.
    async fn upsert(&self, folder_id: &str, children: &[Node], subfolder_ids: &[String])
        -> Result<()>;

    /// Records the aggregated subtree summary, marking the subtree as fully
    /// read as of `timestamp`.
    async fn set_summary(&self, folder_id: &str, summary: &str, timestamp: i64) -> Result<()>;

    async fn clear_summary(&self, folder_id: &str) -> Result<()>;

    /// Rebuilds the flat node list for `root` purely from cache rows.
    /// Returns `None` as soon as any reachable subfolder has no row (an
    /// interrupted earlier crawl), in which case the caller must re-crawl.
    async fn assemble_tree(&self, root: &str) -> Result<Option<Vec<Node>>>;
}

/// SQLite implementation of [`CheckpointStore`].
pub struct SqliteCheckpointRepository {
    pool: SqlitePool,
}

impl SqliteCheckpointRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<FolderRecord> {
        let children: String = row.get("children");
        let subfolder_ids: Option<String> = row.get("subfolder_ids");
        Ok(FolderRecord {
            folder_id: row.get("folder_id"),
            children: serde_json::from_str(&children)?,
            subfolder_ids: match subfolder_ids {
                Some(json) => serde_json::from_str(&json)?,
                None => Vec::new(),
            },
            summary: row.get("summary"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointRepository {
    async fn get(&self, folder_id: &str) -> Result<Option<FolderRecord>> {
        let row = sqlx::query(
            "SELECT folder_id, children, subfolder_ids, summary, created_at, updated_at \
             FROM folder_cache WHERE folder_id = ?",
        )
        .bind(folder_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn upsert(
        &self,
        folder_id: &str,
        children: &[Node],
        subfolder_ids: &[String],
    ) -> Result<()> {
        let children_json = serde_json::to_string(children)?;
        let subfolder_json = if subfolder_ids.is_empty() {
            None
        } else {
            Some(serde_json::to_string(subfolder_ids)?)
        };
        let now = now_millis();

        sqlx::query(
            r#"
            INSERT INTO folder_cache (folder_id, children, subfolder_ids, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(folder_id) DO UPDATE SET
                children = excluded.children,
                subfolder_ids = excluded.subfolder_ids,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(folder_id)
        .bind(children_json)
        .bind(subfolder_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(folder_id, children = children.len(), "Checkpointed folder listing");
        Ok(())
    }

    async fn set_summary(&self, folder_id: &str, summary: &str, timestamp: i64) -> Result<()> {
        sqlx::query("UPDATE folder_cache SET summary = ?, updated_at = ? WHERE folder_id = ?")
            .bind(summary)
            .bind(timestamp)
            .bind(folder_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_summary(&self, folder_id: &str) -> Result<()> {
        sqlx::query("UPDATE folder_cache SET summary = NULL WHERE folder_id = ?")
            .bind(folder_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn assemble_tree(&self, root: &str) -> Result<Option<Vec<Node>>> {
        let Some(record) = self.get(root).await? else {
            return Ok(None);
        };

        let mut nodes = record.children;
        let mut frontier: VecDeque<String> = record.subfolder_ids.into();

        while let Some(folder_id) = frontier.pop_front() {
            // A reachable subfolder without a row means the previous crawl
            // was interrupted before finishing this subtree.
            let Some(record) = self.get(&folder_id).await? else {
                return Ok(None);
            };
            nodes.extend(record.children);
            frontier.extend(record.subfolder_ids);
        }

        Ok(Some(nodes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::NodeKind;

    fn file(id: &str, parent: &str) -> Node {
        Node {
            id: id.to_string(),
            name: format!("{}.bin", id),
            kind: NodeKind::File,
            size: 1,
            content_hash: None,
            modified_at: None,
            parent_id: parent.to_string(),
        }
    }

    fn folder(id: &str, parent: &str) -> Node {
        Node {
            id: id.to_string(),
            name: id.to_string(),
            kind: NodeKind::Folder,
            size: 0,
            content_hash: None,
            modified_at: None,
            parent_id: parent.to_string(),
        }
    }

    async fn repo() -> SqliteCheckpointRepository {
        SqliteCheckpointRepository::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn upsert_and_get_roundtrip() {
        let repo = repo().await;
        let children = vec![file("f1", "root"), folder("d1", "root")];
        repo.upsert("root", &children, &["d1".to_string()]).await.unwrap();

        let record = repo.get("root").await.unwrap().unwrap();
        assert_eq!(record.children, children);
        assert_eq!(record.subfolder_ids, vec!["d1"]);
        assert!(record.summary.is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_children_but_keeps_summary() {
        let repo = repo().await;
        repo.upsert("root", &[file("f1", "root")], &[]).await.unwrap();
        repo.set_summary("root", "{\"files\":1}", 42).await.unwrap();

        repo.upsert("root", &[file("f2", "root")], &[]).await.unwrap();
        let record = repo.get("root").await.unwrap().unwrap();
        assert_eq!(record.children[0].id, "f2");
        assert_eq!(record.summary.as_deref(), Some("{\"files\":1}"));

        repo.clear_summary("root").await.unwrap();
        assert!(repo.get("root").await.unwrap().unwrap().summary.is_none());
    }

    #[tokio::test]
    async fn assemble_tree_walks_cached_subfolders() {
        let repo = repo().await;
        repo.upsert(
            "root",
            &[folder("d1", "root"), file("f1", "root")],
            &["d1".to_string()],
        )
        .await
        .unwrap();
        repo.upsert("d1", &[file("f2", "d1")], &[]).await.unwrap();

        let nodes = repo.assemble_tree("root").await.unwrap().unwrap();
        let ids: Vec<_> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "f1", "f2"]);
    }

    #[tokio::test]
    async fn assemble_tree_reports_incomplete_cache() {
        let repo = repo().await;
        // d1 is referenced but has no row of its own: an earlier crawl died
        // before finishing it.
        repo.upsert("root", &[folder("d1", "root")], &["d1".to_string()])
            .await
            .unwrap();

        assert!(repo.assemble_tree("root").await.unwrap().is_none());
        assert!(repo.assemble_tree("unknown").await.unwrap().is_none());
    }
}

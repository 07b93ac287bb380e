//! Hash index: content hash → already-present remote object ids.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::models::Node;

/// Optional index letting a copy substitute an existing object with
/// identical content for the one requested, avoiding a redundant transfer.
#[async_trait]
pub trait HashIndex: Send + Sync {
    /// Records a `(file id, content hash)` pair. Returns `false` when the id
    /// was already indexed.
    async fn insert(&self, file_id: &str, content_hash: &str) -> Result<bool>;

    /// A uniformly random usable file id carrying this content hash, if any.
    async fn lookup(&self, content_hash: &str) -> Result<Option<String>>;

    /// Marks an indexed id as unusable (e.g. the object was trashed) without
    /// forgetting the hash.
    async fn invalidate(&self, file_id: &str) -> Result<()>;

    /// Indexes every hashed file in a crawled node list; returns how many
    /// new entries were added.
    async fn index_nodes(&self, nodes: &[Node]) -> Result<u64> {
        let mut added = 0;
        for node in nodes.iter().filter(|n| !n.is_folder()) {
            if let Some(hash) = &node.content_hash {
                if self.insert(&node.id, hash).await? {
                    added += 1;
                }
            }
        }
        Ok(added)
    }
}

/// SQLite implementation of [`HashIndex`].
pub struct SqliteHashIndex {
    pool: SqlitePool,
}

impl SqliteHashIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HashIndex for SqliteHashIndex {
    async fn insert(&self, file_id: &str, content_hash: &str) -> Result<bool> {
        let affected = sqlx::query(
            "INSERT OR IGNORE INTO hash_index (file_id, content_hash, status) \
             VALUES (?, ?, 'normal')",
        )
        .bind(file_id)
        .bind(content_hash)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    async fn lookup(&self, content_hash: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT file_id FROM hash_index WHERE content_hash = ? AND status = 'normal' \
             ORDER BY RANDOM() LIMIT 1",
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get("file_id")))
    }

    async fn invalidate(&self, file_id: &str) -> Result<()> {
        sqlx::query("UPDATE hash_index SET status = 'trashed' WHERE file_id = ?")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

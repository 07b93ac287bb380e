//! Persisted data model.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::StoreError;

/// One remote object as discovered by the crawler.
///
/// `parent_id` is always the folder whose listing produced the node; the
/// listing API returns children without a back-reference, and when an object
/// reports several parents of its own the listing context wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<i64>,
    pub parent_id: String,
}

impl Node {
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

/// Cached listing of one folder.
///
/// Rows exist only for folders whose listing completed successfully; a
/// listing cut short by exhausted retries is never written. If `summary` is
/// non-null, this folder's entire subtree was fully read at `updated_at`.
#[derive(Debug, Clone)]
pub struct FolderRecord {
    pub folder_id: String,
    pub children: Vec<Node>,
    pub subfolder_ids: Vec<String>,
    /// Aggregated subtree statistics, JSON-encoded by the engine.
    pub summary: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Durable record of one source → target replication operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTask {
    pub id: i64,
    pub source_id: String,
    pub target_id: String,
    pub status: TaskStatus,
    pub ctime: i64,
    pub ftime: Option<i64>,
}

/// Copy task lifecycle.
///
/// `Copying → Finished` on success, `Copying → Interrupted` on abnormal
/// process termination, `Copying → Error` on an unrecoverable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Copying,
    Interrupted,
    Error,
    Finished,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Copying => "copying",
            TaskStatus::Interrupted => "interrupted",
            TaskStatus::Error => "error",
            TaskStatus::Finished => "finished",
        }
    }

    /// A task in a terminal or interrupted state may be continued or
    /// restarted; a copying task may not be doubled up on.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Copying)
    }
}

impl FromStr for TaskStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "copying" => Ok(TaskStatus::Copying),
            "interrupted" => Ok(TaskStatus::Interrupted),
            "error" => Ok(TaskStatus::Error),
            "finished" => Ok(TaskStatus::Finished),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of a task's id-mapping log: a replicated source folder and its
/// destination counterpart. `seq` preserves append order, so the first entry
/// of a task is always the root mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub seq: i64,
    pub source_id: String,
    pub dest_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_roundtrips_through_json() {
        let node = Node {
            id: "f1".to_string(),
            name: "a.bin".to_string(),
            kind: NodeKind::File,
            size: 42,
            content_hash: Some("abc".to_string()),
            modified_at: None,
            parent_id: "root".to_string(),
        };
        let json = serde_json::to_string(&node).unwrap();
        assert!(json.contains("\"kind\":\"file\""));
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn task_status_parses_both_ways() {
        for status in [
            TaskStatus::Copying,
            TaskStatus::Interrupted,
            TaskStatus::Error,
            TaskStatus::Finished,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("paused".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn only_copying_is_active() {
        assert!(TaskStatus::Copying.is_active());
        assert!(!TaskStatus::Interrupted.is_active());
        assert!(!TaskStatus::Error.is_active());
        assert!(!TaskStatus::Finished.is_active());
    }
}

//! # Persistence layer
//!
//! SQLite-backed stores used by the engine:
//!
//! - [`CheckpointStore`]: per-folder listing cache enabling incremental and
//!   resumable crawls
//! - [`TaskStore`]: durable copy-task records with append-only id-mapping
//!   and completed-file logs
//! - [`HashIndex`]: content-hash → existing-object lookups for transfer
//!   substitution
//!
//! All appends are idempotent (`INSERT OR IGNORE` on natural keys) so
//! re-applying work after a retry or a resumed run is safe, and a crash
//! mid-append can never corrupt previously committed entries.

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use db::{create_pool, create_test_pool, initialize_schema};
pub use error::{Result, StoreError};
pub use models::{CopyTask, FolderRecord, MappingEntry, Node, NodeKind, TaskStatus};
pub use repositories::checkpoint::{CheckpointStore, SqliteCheckpointRepository};
pub use repositories::hash_index::{HashIndex, SqliteHashIndex};
pub use repositories::task::{SqliteTaskRepository, TaskStore};

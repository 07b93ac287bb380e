//! # Google Drive provider
//!
//! Remote Tree API client for Google Drive API v3: cursor-paginated child
//! listing, object metadata, folder creation, server-side copy-by-id, move,
//! trash, and delete. Every call goes through the [`RequestExecutor`], which
//! owns retry, per-attempt timeouts, bearer-token injection from the
//! credential pool, and failure classification.

pub mod client;
pub mod error;
pub mod executor;
pub mod types;

pub use client::{ChildPage, DriveClient, ListOptions, TreeApi};
pub use error::{DriveError, Result};
pub use executor::RequestExecutor;
pub use types::{DriveObject, RemoteObject, FOLDER_MIME_TYPE};

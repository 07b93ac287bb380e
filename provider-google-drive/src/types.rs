//! Google Drive API v3 wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// MIME type that marks an object as a folder.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// File resource as returned by `files.list` / `files.get`.
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveObject {
    pub id: String,

    pub name: String,

    pub mime_type: String,

    /// File size in bytes, serialized as a decimal string (absent for
    /// folders).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// MD5 of the content (absent for folders and native docs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_checksum: Option<String>,

    /// Modification time (RFC 3339), only requested for snapshot listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,

    /// Parent folder IDs as reported by the object itself.
    #[serde(default)]
    pub parents: Vec<String>,

    #[serde(default)]
    pub trashed: bool,
}

impl DriveObject {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

/// `files.list` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesListResponse {
    #[serde(default)]
    pub files: Vec<DriveObject>,

    #[serde(default)]
    pub next_page_token: Option<String>,

    #[serde(default)]
    pub incomplete_search: bool,
}

/// Request body for folder creation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderBody {
    pub name: String,
    pub mime_type: String,
    pub parents: Vec<String>,
}

/// Request body for `files.copy`.
#[derive(Debug, Serialize)]
pub struct CopyBody {
    pub parents: Vec<String>,
}

/// Request body for trashing an object.
#[derive(Debug, Serialize)]
pub struct TrashBody {
    pub trashed: bool,
}

/// Minimal body carrying the id of a created/copied object.
#[derive(Debug, Deserialize)]
pub struct CreatedObject {
    pub id: String,
}

/// Structured error body: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Normalized object handed to the engine.
///
/// `parents` is the object's own back-reference list; the crawler stamps its
/// own parent id from the listing context instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
    pub size: u64,
    pub content_hash: Option<String>,
    pub modified_at: Option<i64>,
    pub parents: Vec<String>,
}

impl From<DriveObject> for RemoteObject {
    fn from(object: DriveObject) -> Self {
        let is_folder = object.is_folder();
        Self {
            id: object.id,
            name: object.name,
            is_folder,
            size: object.size.and_then(|s| s.parse().ok()).unwrap_or(0),
            content_hash: object.md5_checksum,
            modified_at: object.modified_time.as_deref().and_then(parse_timestamp),
            parents: object.parents,
        }
    }
}

fn parse_timestamp(rfc3339: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(rfc3339)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp())
}

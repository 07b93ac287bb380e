//! Remote Tree API client for Google Drive v3.

use async_trait::async_trait;
use bridge_http::{HttpClient, HttpRequest};
use bytes::Bytes;
use core_auth::CredentialPool;
use core_runtime::config::MirrorConfig;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{DriveError, Result};
use crate::executor::RequestExecutor;
use crate::types::{
    CopyBody, CreateFolderBody, CreatedObject, DriveObject, FilesListResponse, RemoteObject,
    TrashBody, FOLDER_MIME_TYPE,
};

/// Drive API base URL.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Fields requested for listings.
const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, size, md5Checksum)";

/// Listing fields including modification times (tree snapshots).
const LIST_FIELDS_WITH_TIME: &str =
    "nextPageToken, files(id, name, mimeType, modifiedTime, size, md5Checksum)";

/// Fields requested for single-object metadata.
const OBJECT_FIELDS: &str = "id, name, size, parents, mimeType, md5Checksum, modifiedTime";

/// Options for a child-listing call.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Request `modifiedTime` per child (tree snapshots).
    pub with_timestamps: bool,
    /// The folder lives outside shared drives; omit the all-drives flags.
    pub plain_folder: bool,
    /// Authenticate with a service identity instead of the primary account.
    pub use_service_identity: bool,
}

/// One page of a folder's children.
#[derive(Debug, Clone)]
pub struct ChildPage {
    pub children: Vec<RemoteObject>,
    pub next_page_token: Option<String>,
}

/// Abstract remote tree operations.
///
/// The crawler, copy orchestrator, and dedup flow consume this trait so
/// tests can substitute a scripted remote.
#[async_trait]
pub trait TreeApi: Send + Sync {
    /// Fetches one page of a folder's children. Pagination within a folder
    /// is inherently serial: the next call needs this page's token.
    async fn list_children_page(
        &self,
        folder_id: &str,
        page_token: Option<String>,
        options: &ListOptions,
    ) -> Result<ChildPage>;

    /// Object metadata by id. `Ok(None)` means the object stayed
    /// inaccessible through the retry budget (missing or permission-denied).
    async fn get_object(&self, id: &str, use_service_identity: bool)
        -> Result<Option<RemoteObject>>;

    /// Creates a folder and returns its id.
    async fn create_folder(
        &self,
        name: &str,
        parent_id: &str,
        use_service_identity: bool,
    ) -> Result<String>;

    /// Server-side copy; returns the new object's id.
    async fn copy_object(
        &self,
        id: &str,
        dest_parent_id: &str,
        use_service_identity: bool,
    ) -> Result<String>;

    /// Reparents an object from its first reported parent to `new_parent_id`.
    async fn move_object(&self, id: &str, new_parent_id: &str, use_service_identity: bool)
        -> Result<()>;

    /// Moves an object to the trash (recoverable).
    async fn trash_object(&self, id: &str, use_service_identity: bool) -> Result<()>;

    /// Permanently deletes an object.
    async fn delete_object(&self, id: &str, use_service_identity: bool) -> Result<()>;
}

/// Production [`TreeApi`] implementation over the Drive v3 REST surface.
pub struct DriveClient {
    executor: RequestExecutor,
    page_size: u32,
}

impl DriveClient {
    pub fn new(http: Arc<dyn HttpClient>, pool: Arc<CredentialPool>, config: &MirrorConfig) -> Self {
        Self {
            executor: RequestExecutor::new(http, pool, config),
            page_size: config.page_size,
        }
    }

    fn files_url() -> String {
        format!("{}/files", DRIVE_API_BASE)
    }

    fn file_url(id: &str) -> String {
        format!("{}/files/{}", DRIVE_API_BASE, id)
    }

    fn with_all_drives(request: HttpRequest) -> HttpRequest {
        request
            .query("supportsAllDrives", "true")
            .query("includeItemsFromAllDrives", "true")
    }
}

#[async_trait]
impl TreeApi for DriveClient {
    #[instrument(skip(self, page_token, options), fields(folder_id = %folder_id))]
    async fn list_children_page(
        &self,
        folder_id: &str,
        page_token: Option<String>,
        options: &ListOptions,
    ) -> Result<ChildPage> {
        let query = format!("'{}' in parents and trashed = false", folder_id);
        let fields = if options.with_timestamps {
            LIST_FIELDS_WITH_TIME
        } else {
            LIST_FIELDS
        };
        // "root" is the personal-drive alias and never lives in a shared
        // drive, so the all-drives flags are dropped for it.
        let all_drives = folder_id != "root" && !options.plain_folder;
        let page_size = self.page_size.to_string();

        let response = self
            .executor
            .execute(
                || {
                    let mut request = HttpRequest::get(Self::files_url())
                        .query("q", &query)
                        .query("orderBy", "folder,name desc")
                        .query("fields", fields)
                        .query("pageSize", &page_size);
                    if all_drives {
                        request = request
                            .query("supportsAllDrives", "true")
                            .query("includeItemsFromAllDrives", "true");
                    }
                    if let Some(token) = &page_token {
                        request = request.query("pageToken", token);
                    }
                    request
                },
                options.use_service_identity,
            )
            .await?;

        let listing: FilesListResponse = response
            .json()
            .map_err(|e| DriveError::Parse(format!("files.list response: {}", e)))?;

        debug!(
            children = listing.files.len(),
            has_next = listing.next_page_token.is_some(),
            "Listed folder page"
        );

        Ok(ChildPage {
            children: listing.files.into_iter().map(RemoteObject::from).collect(),
            next_page_token: listing.next_page_token,
        })
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn get_object(
        &self,
        id: &str,
        use_service_identity: bool,
    ) -> Result<Option<RemoteObject>> {
        let result = self
            .executor
            .execute(
                || {
                    Self::with_all_drives(HttpRequest::get(Self::file_url(id)))
                        .query("corpora", "allDrives")
                        .query("fields", OBJECT_FIELDS)
                },
                use_service_identity,
            )
            .await;

        match result {
            Ok(response) => {
                let object: DriveObject = response
                    .json()
                    .map_err(|e| DriveError::Parse(format!("files.get response: {}", e)))?;
                Ok(Some(object.into()))
            }
            // Inaccessible after the full retry budget: the caller reports
            // the object as unreachable rather than aborting everything.
            Err(DriveError::NotFound)
            | Err(DriveError::PermissionDenied { .. })
            | Err(DriveError::RetriesExhausted { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, name), fields(parent_id = %parent_id))]
    async fn create_folder(
        &self,
        name: &str,
        parent_id: &str,
        use_service_identity: bool,
    ) -> Result<String> {
        let body = CreateFolderBody {
            name: name.to_string(),
            mime_type: FOLDER_MIME_TYPE.to_string(),
            parents: vec![parent_id.to_string()],
        };
        let body = Bytes::from(
            serde_json::to_vec(&body)
                .map_err(|e| DriveError::Parse(format!("create body: {}", e)))?,
        );

        let response = self
            .executor
            .execute(
                || {
                    HttpRequest::post(Self::files_url())
                        .query("supportsAllDrives", "true")
                        .header("Content-Type", "application/json")
                        .body(body.clone())
                },
                use_service_identity,
            )
            .await?;

        let created: CreatedObject = response
            .json()
            .map_err(|e| DriveError::Parse(format!("files.create response: {}", e)))?;
        Ok(created.id)
    }

    #[instrument(skip(self), fields(id = %id, dest = %dest_parent_id))]
    async fn copy_object(
        &self,
        id: &str,
        dest_parent_id: &str,
        use_service_identity: bool,
    ) -> Result<String> {
        let body = CopyBody {
            parents: vec![dest_parent_id.to_string()],
        };
        let body = Bytes::from(
            serde_json::to_vec(&body).map_err(|e| DriveError::Parse(format!("copy body: {}", e)))?,
        );

        let response = self
            .executor
            .execute(
                || {
                    HttpRequest::post(format!("{}/copy", Self::file_url(id)))
                        .query("supportsAllDrives", "true")
                        .header("Content-Type", "application/json")
                        .body(body.clone())
                },
                use_service_identity,
            )
            .await?;

        let created: CreatedObject = response
            .json()
            .map_err(|e| DriveError::Parse(format!("files.copy response: {}", e)))?;
        Ok(created.id)
    }

    #[instrument(skip(self), fields(id = %id, new_parent = %new_parent_id))]
    async fn move_object(
        &self,
        id: &str,
        new_parent_id: &str,
        use_service_identity: bool,
    ) -> Result<()> {
        let object = self
            .get_object(id, use_service_identity)
            .await?
            .ok_or(DriveError::NotFound)?;
        let remove_parents = object.parents.first().cloned().unwrap_or_default();

        self.executor
            .execute(
                || {
                    Self::with_all_drives(HttpRequest::patch(Self::file_url(id)))
                        .query("removeParents", &remove_parents)
                        .query("addParents", new_parent_id)
                        .header("Content-Type", "application/json")
                        .body(Bytes::from_static(b"{}"))
                },
                use_service_identity,
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn trash_object(&self, id: &str, use_service_identity: bool) -> Result<()> {
        let body = Bytes::from(
            serde_json::to_vec(&TrashBody { trashed: true })
                .map_err(|e| DriveError::Parse(format!("trash body: {}", e)))?,
        );
        self.executor
            .execute(
                || {
                    HttpRequest::patch(Self::file_url(id))
                        .query("supportsAllDrives", "true")
                        .header("Content-Type", "application/json")
                        .body(body.clone())
                },
                use_service_identity,
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn delete_object(&self, id: &str, use_service_identity: bool) -> Result<()> {
        self.executor
            .execute(
                || HttpRequest::delete(Self::file_url(id)).query("supportsAllDrives", "true"),
                use_service_identity,
            )
            .await?;
        Ok(())
    }
}

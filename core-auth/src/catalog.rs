//! Identity catalog: the ordered universe of service credentials.
//!
//! The pool never sees the whole catalog at once. It pulls fixed-size
//! batches from the unseen tail, so identities that error out within a batch
//! are dropped without touching the rest of the catalog.

use crate::error::{AuthError, Result};
use crate::types::OAuthCredentials;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Source of service-identity credentials, consumed batch by batch.
#[async_trait]
pub trait IdentityCatalog: Send + Sync {
    /// Returns up to `size` credentials from the unseen tail and advances the
    /// cursor. An empty vec means the catalog is exhausted.
    async fn next_batch(&self, size: usize) -> Result<Vec<OAuthCredentials>>;

    /// Rewinds the cursor so the next batch is the first one again.
    fn reset(&self);

    /// Total number of identities the catalog knows about.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Catalog backed by a directory of `*.json` credential files.
///
/// Files are ordered lexically and parsed lazily per batch; unreadable or
/// malformed files are skipped with a warning rather than failing the batch.
/// The file stem becomes the identity label.
pub struct DirCatalog {
    files: Vec<PathBuf>,
    cursor: Mutex<usize>,
}

impl DirCatalog {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            AuthError::Catalog(format!("Cannot read catalog directory {}: {}", dir.display(), e))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        Ok(Self {
            files,
            cursor: Mutex::new(0),
        })
    }

    fn parse_file(path: &Path) -> Option<OAuthCredentials> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable credential file");
                return None;
            }
        };
        match serde_json::from_slice::<OAuthCredentials>(&data) {
            Ok(mut creds) => {
                if creds.label.is_empty() {
                    creds.label = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                }
                Some(creds)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping malformed credential file");
                None
            }
        }
    }
}

#[async_trait]
impl IdentityCatalog for DirCatalog {
    async fn next_batch(&self, size: usize) -> Result<Vec<OAuthCredentials>> {
        let (start, end) = {
            let mut cursor = self.cursor.lock().expect("catalog cursor poisoned");
            let start = *cursor;
            let end = (start + size).min(self.files.len());
            *cursor = end;
            (start, end)
        };

        Ok(self.files[start..end]
            .iter()
            .filter_map(|path| Self::parse_file(path))
            .collect())
    }

    fn reset(&self) {
        *self.cursor.lock().expect("catalog cursor poisoned") = 0;
    }

    fn len(&self) -> usize {
        self.files.len()
    }
}

/// In-memory catalog, mainly for tests and embedded deployments.
pub struct StaticCatalog {
    identities: Vec<OAuthCredentials>,
    cursor: Mutex<usize>,
}

impl StaticCatalog {
    pub fn new(identities: Vec<OAuthCredentials>) -> Self {
        Self {
            identities,
            cursor: Mutex::new(0),
        }
    }
}

#[async_trait]
impl IdentityCatalog for StaticCatalog {
    async fn next_batch(&self, size: usize) -> Result<Vec<OAuthCredentials>> {
        let mut cursor = self.cursor.lock().expect("catalog cursor poisoned");
        let start = *cursor;
        let end = (start + size).min(self.identities.len());
        *cursor = end;
        Ok(self.identities[start..end].to_vec())
    }

    fn reset(&self) {
        *self.cursor.lock().expect("catalog cursor poisoned") = 0;
    }

    fn len(&self) -> usize {
        self.identities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(label: &str) -> OAuthCredentials {
        OAuthCredentials {
            client_id: format!("client-{}", label),
            client_secret: "secret".to_string(),
            refresh_token: "refresh".to_string(),
            label: label.to_string(),
        }
    }

    #[tokio::test]
    async fn static_catalog_batches_segment_the_tail() {
        let catalog = StaticCatalog::new(vec![creds("a"), creds("b"), creds("c")]);

        let first = catalog.next_batch(2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].label, "a");

        let second = catalog.next_batch(2).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].label, "c");

        assert!(catalog.next_batch(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_rewinds_to_first_batch() {
        let catalog = StaticCatalog::new(vec![creds("a"), creds("b")]);
        catalog.next_batch(2).await.unwrap();
        assert!(catalog.next_batch(2).await.unwrap().is_empty());

        catalog.reset();
        assert_eq!(catalog.next_batch(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dir_catalog_reads_sorted_json_files() {
        let dir = std::env::temp_dir().join(format!("drivemirror-catalog-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["b.json", "a.json", "ignored.txt"] {
            let body = r#"{"client_id":"c","client_secret":"s","refresh_token":"r"}"#;
            std::fs::write(dir.join(name), body).unwrap();
        }
        std::fs::write(dir.join("c.json"), "{not json").unwrap();

        let catalog = DirCatalog::new(&dir).unwrap();
        assert_eq!(catalog.len(), 3);

        let batch = catalog.next_batch(10).await.unwrap();
        // c.json is malformed and skipped; labels come from file stems.
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].label, "a");
        assert_eq!(batch[1].label, "b");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}

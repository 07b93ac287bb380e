//! Scripted in-memory remote tree for engine tests.

use async_trait::async_trait;
use provider_google_drive::{
    ChildPage, DriveError, ListOptions, RemoteObject, Result as DriveResult, TreeApi,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Failure kinds a test can inject per object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Capacity,
    Quota,
    RetriesExhausted,
    NotFound,
}

fn make_error(failure: Failure) -> DriveError {
    match failure {
        Failure::Capacity => DriveError::CapacityExceeded {
            message: "The file limit for this shared drive has been exceeded".to_string(),
        },
        Failure::Quota => DriveError::QuotaExceeded {
            message: "User rate limit exceeded".to_string(),
        },
        Failure::RetriesExhausted => DriveError::RetriesExhausted {
            attempts: 7,
            last: "request timed out".to_string(),
        },
        Failure::NotFound => DriveError::NotFound,
    }
}

/// In-memory [`TreeApi`] with per-object failure injection and a call log.
pub struct FakeTree {
    objects: Mutex<HashMap<String, RemoteObject>>,
    children: Mutex<HashMap<String, Vec<RemoteObject>>>,
    page_size: usize,
    list_failures: Mutex<HashMap<String, Failure>>,
    copy_failures: Mutex<HashMap<String, Failure>>,
    create_failures: Mutex<HashMap<String, Failure>>,
    calls: Mutex<Vec<String>>,
    copied: AtomicUsize,
}

impl FakeTree {
    pub fn new() -> Self {
        Self::with_page_size(100)
    }

    /// A small page size forces multi-page listings.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            children: Mutex::new(HashMap::new()),
            page_size,
            list_failures: Mutex::new(HashMap::new()),
            copy_failures: Mutex::new(HashMap::new()),
            create_failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            copied: AtomicUsize::new(0),
        }
    }

    fn register(&self, object: RemoteObject, parent: Option<&str>) {
        if let Some(parent) = parent {
            self.children
                .lock()
                .unwrap()
                .entry(parent.to_string())
                .or_default()
                .push(object.clone());
        }
        if object.is_folder {
            self.children
                .lock()
                .unwrap()
                .entry(object.id.clone())
                .or_default();
        }
        self.objects.lock().unwrap().insert(object.id.clone(), object);
    }

    /// Registers the crawl/copy root itself (no parent).
    pub fn add_root(&self, id: &str, name: &str) {
        self.register(folder_object(id, name), None);
    }

    pub fn add_folder(&self, id: &str, name: &str, parent: &str) {
        self.register(folder_object(id, name), Some(parent));
    }

    pub fn add_file(&self, id: &str, name: &str, parent: &str, size: u64, hash: Option<&str>) {
        let object = RemoteObject {
            id: id.to_string(),
            name: name.to_string(),
            is_folder: false,
            size,
            content_hash: hash.map(str::to_string),
            modified_at: None,
            parents: vec![parent.to_string()],
        };
        self.register(object, Some(parent));
    }

    pub fn fail_listing(&self, folder_id: &str, failure: Failure) {
        self.list_failures
            .lock()
            .unwrap()
            .insert(folder_id.to_string(), failure);
    }

    pub fn fail_copy(&self, file_id: &str, failure: Failure) {
        self.copy_failures
            .lock()
            .unwrap()
            .insert(file_id.to_string(), failure);
    }

    pub fn fail_create(&self, folder_name: &str, failure: Failure) {
        self.create_failures
            .lock()
            .unwrap()
            .insert(folder_name.to_string(), failure);
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn copied_count(&self) -> usize {
        self.copied.load(Ordering::SeqCst)
    }
}

fn folder_object(id: &str, name: &str) -> RemoteObject {
    RemoteObject {
        id: id.to_string(),
        name: name.to_string(),
        is_folder: true,
        size: 0,
        content_hash: None,
        modified_at: None,
        parents: Vec::new(),
    }
}

#[async_trait]
impl TreeApi for FakeTree {
    async fn list_children_page(
        &self,
        folder_id: &str,
        page_token: Option<String>,
        _options: &ListOptions,
    ) -> DriveResult<ChildPage> {
        let page: usize = page_token
            .as_deref()
            .and_then(|t| t.strip_prefix("page:"))
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        self.record(format!("list {}:{}", folder_id, page));

        if let Some(failure) = self.list_failures.lock().unwrap().get(folder_id) {
            return Err(make_error(*failure));
        }

        let all = self
            .children
            .lock()
            .unwrap()
            .get(folder_id)
            .cloned()
            .unwrap_or_default();
        let start = page * self.page_size;
        let end = (start + self.page_size).min(all.len());
        let children = if start < all.len() {
            all[start..end].to_vec()
        } else {
            Vec::new()
        };
        let next_page_token = if end < all.len() {
            Some(format!("page:{}", page + 1))
        } else {
            None
        };

        Ok(ChildPage {
            children,
            next_page_token,
        })
    }

    async fn get_object(
        &self,
        id: &str,
        _use_service_identity: bool,
    ) -> DriveResult<Option<RemoteObject>> {
        self.record(format!("get {}", id));
        Ok(self.objects.lock().unwrap().get(id).cloned())
    }

    async fn create_folder(
        &self,
        name: &str,
        parent_id: &str,
        _use_service_identity: bool,
    ) -> DriveResult<String> {
        self.record(format!("create {} under {}", name, parent_id));
        if let Some(failure) = self.create_failures.lock().unwrap().get(name) {
            return Err(make_error(*failure));
        }
        let id = format!("dst-{}", name);
        self.register(folder_object(&id, name), Some(parent_id));
        Ok(id)
    }

    async fn copy_object(
        &self,
        id: &str,
        dest_parent_id: &str,
        use_service_identity: bool,
    ) -> DriveResult<String> {
        self.record(format!(
            "copy {} -> {}{}",
            id,
            dest_parent_id,
            if use_service_identity { " [sa]" } else { "" }
        ));
        if let Some(failure) = self.copy_failures.lock().unwrap().get(id) {
            return Err(make_error(*failure));
        }
        self.copied.fetch_add(1, Ordering::SeqCst);
        Ok(format!("copy-of-{}", id))
    }

    async fn move_object(
        &self,
        id: &str,
        new_parent_id: &str,
        _use_service_identity: bool,
    ) -> DriveResult<()> {
        self.record(format!("move {} -> {}", id, new_parent_id));
        Ok(())
    }

    async fn trash_object(&self, id: &str, _use_service_identity: bool) -> DriveResult<()> {
        self.record(format!("trash {}", id));
        Ok(())
    }

    async fn delete_object(&self, id: &str, _use_service_identity: bool) -> DriveResult<()> {
        self.record(format!("delete {}", id));
        Ok(())
    }
}

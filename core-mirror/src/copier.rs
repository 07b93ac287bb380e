//! Copy orchestrator.
//!
//! Replays a source tree at a destination in two phases: folder structure
//! first (breadth-first by source depth level, because a child's destination
//! parent must exist before the child), then files through a fixed-size
//! worker pool. Every completed folder mapping and file copy is persisted
//! immediately, so a crash loses at most the in-flight requests and a
//! resumed run replays nothing that already finished.

use core_runtime::config::MirrorConfig;
use core_runtime::events::{CopyEvent, EventBus, MirrorEvent};
use core_store::models::TaskStatus;
use core_store::repositories::hash_index::HashIndex;
use core_store::repositories::task::TaskStore;
use core_store::CopyTask;
use provider_google_drive::{RemoteObject, TreeApi};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::crawler::{CrawlOptions, TreeCrawler};
use crate::error::{MirrorError, Result};
use crate::types::{validate_fid, Node};

/// Parameters of one copy request.
#[derive(Debug, Clone)]
pub struct CopyRequest {
    pub source: String,
    /// Destination root; falls back to the configured default target.
    pub target: Option<String>,
    /// Name for the replicated root folder (defaults to the source's name).
    pub new_name: Option<String>,
    /// Skip files smaller than this many bytes.
    pub min_size: Option<u64>,
    /// Re-list the source instead of trusting checkpointed listings.
    pub refresh: bool,
    /// Copy directly into the target instead of creating a root folder.
    pub skip_root_folder: bool,
    /// The source lives outside shared drives.
    pub plain_folder: bool,
    /// Authenticate with service identities.
    pub use_service_identity: bool,
    /// Substitute already-present objects with identical content hashes
    /// instead of transferring new bytes.
    pub hash_substitution: bool,
}

impl CopyRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: None,
            new_name: None,
            min_size: None,
            refresh: false,
            skip_root_folder: false,
            plain_folder: false,
            use_service_identity: false,
            hash_substitution: false,
        }
    }

    pub fn to_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// What to do with an existing task for the requested pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeChoice {
    /// Reuse the mapping and completed-file logs; copy only what is missing.
    Continue,
    /// New destination root, discard prior logs, copy everything again.
    Restart,
    /// Do nothing.
    Exit,
}

/// Supplies the resume decision for an existing non-running task.
///
/// The choice is always explicit: an interactive host prompts, an unattended
/// one installs [`AutoContinue`]. It is never silently inferred.
#[async_trait::async_trait]
pub trait ResumeDecider: Send + Sync {
    async fn decide(&self, task: &CopyTask) -> ResumeChoice;
}

/// Always continues; for servers and other unattended contexts.
pub struct AutoContinue;

#[async_trait::async_trait]
impl ResumeDecider for AutoContinue {
    async fn decide(&self, _task: &CopyTask) -> ResumeChoice {
        ResumeChoice::Continue
    }
}

/// Result of a completed copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    /// Task backing the copy; `None` for the direct single-file path.
    pub task_id: Option<i64>,
    /// Destination root id (created folder, or the raw target).
    pub dest_root: String,
    pub files_copied: u64,
    pub folders_created: u64,
}

/// Orchestrates resumable tree replication.
pub struct CopyOrchestrator {
    api: Arc<dyn TreeApi>,
    crawler: TreeCrawler,
    tasks: Arc<dyn TaskStore>,
    hash_index: Option<Arc<dyn HashIndex>>,
    config: MirrorConfig,
    events: EventBus,
}

impl CopyOrchestrator {
    pub fn new(
        api: Arc<dyn TreeApi>,
        crawler: TreeCrawler,
        tasks: Arc<dyn TaskStore>,
        hash_index: Option<Arc<dyn HashIndex>>,
        config: MirrorConfig,
        events: EventBus,
    ) -> Self {
        Self {
            api,
            crawler,
            tasks,
            hash_index,
            config,
            events,
        }
    }

    /// Runs one copy request to completion.
    ///
    /// Returns `Ok(None)` when the resume decision was [`ResumeChoice::Exit`].
    ///
    /// # Errors
    ///
    /// - [`MirrorError::TaskConflict`] if a task for the pair is already
    ///   `copying` (rejected outright, never queued)
    /// - [`MirrorError::Inaccessible`] if the source cannot be read
    /// - [`MirrorError::CapacityExceeded`] aborts the task and marks it
    ///   `error`
    pub async fn copy(
        &self,
        request: &CopyRequest,
        decider: &dyn ResumeDecider,
    ) -> Result<Option<CopyOutcome>> {
        let target = request
            .target
            .clone()
            .or_else(|| self.config.default_target.clone())
            .ok_or(MirrorError::MissingTarget)?;
        if !validate_fid(&request.source) {
            return Err(MirrorError::InvalidId(request.source.clone()));
        }
        if !validate_fid(&target) {
            return Err(MirrorError::InvalidId(target));
        }

        let source = self
            .api
            .get_object(&request.source, request.use_service_identity)
            .await
            .map_err(MirrorError::from)?
            .ok_or_else(|| MirrorError::Inaccessible {
                id: request.source.clone(),
            })?;

        if !source.is_folder {
            return self.copy_single_file(&source, &target, request).await.map(Some);
        }

        match self.tasks.find_by_pair(&request.source, &target).await? {
            Some(task) if task.status.is_active() => {
                Err(MirrorError::TaskConflict { task_id: task.id })
            }
            Some(task) => match decider.decide(&task).await {
                ResumeChoice::Exit => {
                    info!(task_id = task.id, "Resume declined, leaving task untouched");
                    Ok(None)
                }
                ResumeChoice::Continue => {
                    self.continue_task(&source, task, &target, request).await.map(Some)
                }
                ResumeChoice::Restart => {
                    self.restart_task(&source, task, &target, request).await.map(Some)
                }
            },
            None => self.fresh_task(&source, &target, request).await.map(Some),
        }
    }

    /// Single file sources are copied directly, without a task record.
    async fn copy_single_file(
        &self,
        source: &RemoteObject,
        target: &str,
        request: &CopyRequest,
    ) -> Result<CopyOutcome> {
        let (copy_id, use_service) = resolve_copy_source(
            &self.hash_index,
            request.hash_substitution,
            &source.id,
            source.content_hash.as_deref(),
            request.use_service_identity,
        )
        .await?;

        self.api
            .copy_object(&copy_id, target, use_service)
            .await
            .map_err(MirrorError::from)?;

        Ok(CopyOutcome {
            task_id: None,
            dest_root: target.to_string(),
            files_copied: 1,
            folders_created: 0,
        })
    }

    async fn fresh_task(
        &self,
        source: &RemoteObject,
        target: &str,
        request: &CopyRequest,
    ) -> Result<CopyOutcome> {
        let dest_root = self.dest_root(source, target, request).await?;
        let task = self.tasks.create(&source.id, target).await?;
        // The root mapping is always the task's first entry.
        self.tasks
            .append_mapping(task.id, &source.id, &dest_root)
            .await?;

        let mut mapping = HashMap::new();
        mapping.insert(source.id.clone(), dest_root.clone());
        self.run_guarded(task.id, source, dest_root, mapping, HashSet::new(), request)
            .await
    }

    async fn continue_task(
        &self,
        source: &RemoteObject,
        task: CopyTask,
        target: &str,
        request: &CopyRequest,
    ) -> Result<CopyOutcome> {
        info!(task_id = task.id, "Continuing task");
        self.tasks.set_status(task.id, TaskStatus::Copying).await?;

        let entries = self.tasks.mapping(task.id).await?;
        let (dest_root, mapping) = if entries.is_empty() {
            // The task row exists but its root mapping was never written
            // (crash between creation and first append); start a fresh root.
            let dest_root = self.dest_root(source, target, request).await?;
            self.tasks
                .append_mapping(task.id, &source.id, &dest_root)
                .await?;
            let mut mapping = HashMap::new();
            mapping.insert(source.id.clone(), dest_root.clone());
            (dest_root, mapping)
        } else {
            let dest_root = entries[0].dest_id.clone();
            let mapping = entries
                .into_iter()
                .map(|entry| (entry.source_id, entry.dest_id))
                .collect();
            (dest_root, mapping)
        };

        let completed: HashSet<String> =
            self.tasks.completed(task.id).await?.into_iter().collect();
        self.run_guarded(task.id, source, dest_root, mapping, completed, request)
            .await
    }

    async fn restart_task(
        &self,
        source: &RemoteObject,
        task: CopyTask,
        target: &str,
        request: &CopyRequest,
    ) -> Result<CopyOutcome> {
        info!(task_id = task.id, "Restarting task with a new destination root");
        let dest_root = self.dest_root(source, target, request).await?;
        self.tasks.set_status(task.id, TaskStatus::Copying).await?;
        self.tasks.clear_mapping(task.id).await?;
        self.tasks.clear_completed(task.id).await?;
        self.tasks
            .append_mapping(task.id, &source.id, &dest_root)
            .await?;

        let mut mapping = HashMap::new();
        mapping.insert(source.id.clone(), dest_root.clone());
        self.run_guarded(task.id, source, dest_root, mapping, HashSet::new(), request)
            .await
    }

    /// Creates (or reuses) the destination root for a task.
    async fn dest_root(
        &self,
        source: &RemoteObject,
        target: &str,
        request: &CopyRequest,
    ) -> Result<String> {
        if request.skip_root_folder {
            return Ok(target.to_string());
        }
        let name = request.new_name.as_deref().unwrap_or(&source.name);
        self.api
            .create_folder(name, target, request.use_service_identity)
            .await
            .map_err(MirrorError::from)
    }

    /// Runs replication; any failure flips the task to `error` before the
    /// error propagates, so state is never left claiming progress.
    async fn run_guarded(
        &self,
        task_id: i64,
        source: &RemoteObject,
        dest_root: String,
        mapping: HashMap<String, String>,
        completed: HashSet<String>,
        request: &CopyRequest,
    ) -> Result<CopyOutcome> {
        let result = self
            .replicate(task_id, source, dest_root, mapping, completed, request)
            .await;
        if let Err(e) = &result {
            warn!(task_id, error = %e, "Copy task failed");
            if let Err(store_err) = self.tasks.set_status(task_id, TaskStatus::Error).await {
                warn!(task_id, error = %store_err, "Failed to record task error status");
            }
            self.events.emit(MirrorEvent::Copy(CopyEvent::Failed {
                task_id,
                message: e.to_string(),
            }));
        }
        result
    }

    async fn replicate(
        &self,
        task_id: i64,
        source: &RemoteObject,
        dest_root: String,
        mapping: HashMap<String, String>,
        completed: HashSet<String>,
        request: &CopyRequest,
    ) -> Result<CopyOutcome> {
        let crawl_options = CrawlOptions {
            refresh_all: request.refresh,
            with_timestamps: false,
            plain_folder: request.plain_folder,
            use_service_identity: request.use_service_identity,
        };
        let crawl = self.crawler.crawl(&source.id, &crawl_options).await?;
        if !crawl.unfinished.is_empty() {
            warn!(
                unfinished = crawl.unfinished.len(),
                "Source tree partially read; unread subtrees are not copied this run"
            );
        }

        let folders: Vec<Node> = crawl.nodes.iter().filter(|n| n.is_folder()).cloned().collect();
        let files: Vec<Node> = crawl
            .nodes
            .iter()
            .filter(|n| !n.is_folder())
            .filter(|n| !completed.contains(&n.id))
            .filter(|n| request.min_size.map_or(true, |min| n.size >= min))
            .cloned()
            .collect();

        info!(
            task_id,
            folders = folders.len(),
            files = files.len(),
            "Starting replication"
        );
        self.events.emit(MirrorEvent::Copy(CopyEvent::Started {
            task_id,
            folders_total: folders.len() as u64,
            files_total: files.len() as u64,
        }));

        let (mapping, folders_created) = self
            .create_folders(task_id, &source.id, &folders, &dest_root, mapping, request)
            .await?;

        let files_copied = self
            .copy_files(task_id, files, Arc::new(mapping), &dest_root, request)
            .await?;

        self.tasks.mark_finished(task_id).await?;
        self.events
            .emit(MirrorEvent::Copy(CopyEvent::Finished { task_id }));
        info!(task_id, files_copied, folders_created, "Copy task finished");

        Ok(CopyOutcome {
            task_id: Some(task_id),
            dest_root,
            files_copied,
            folders_created,
        })
    }

    /// Replicates the folder structure breadth-first by source depth level.
    ///
    /// All not-yet-mapped folders of the current level are created
    /// concurrently under the level's own bound; each success appends to the
    /// persisted mapping log immediately, so a crash mid-level loses at most
    /// the in-flight creations. A `CapacityExceeded` failure cancels the
    /// remaining creations and aborts; any other per-folder failure is
    /// logged and its descendants fall back to the destination root.
    async fn create_folders(
        &self,
        task_id: i64,
        source_id: &str,
        folders: &[Node],
        dest_root: &str,
        mut mapping: HashMap<String, String>,
        request: &CopyRequest,
    ) -> Result<(HashMap<String, String>, u64)> {
        mapping.insert(source_id.to_string(), dest_root.to_string());
        if folders.is_empty() {
            return Ok((mapping, 0));
        }

        let semaphore = Arc::new(Semaphore::new(self.config.parallel_limit));
        let cancel = CancellationToken::new();
        let use_service = request.use_service_identity;
        let mut created_total: u64 = 0;
        let mut fatal: Option<MirrorError> = None;

        let mut current: Vec<Node> = folders
            .iter()
            .filter(|f| f.parent_id == source_id)
            .cloned()
            .collect();

        while !current.is_empty() && fatal.is_none() {
            let mut level_jobs: JoinSet<(String, Result<Option<String>>)> = JoinSet::new();

            for folder in current.iter().filter(|f| !mapping.contains_key(&f.id)) {
                let folder = folder.clone();
                let parent_target = mapping
                    .get(&folder.parent_id)
                    .cloned()
                    .unwrap_or_else(|| dest_root.to_string());
                let api = Arc::clone(&self.api);
                let tasks = Arc::clone(&self.tasks);
                let semaphore = Arc::clone(&semaphore);
                let cancel = cancel.clone();

                level_jobs.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return (folder.id, Ok(None));
                    };
                    if cancel.is_cancelled() {
                        return (folder.id, Ok(None));
                    }
                    match api.create_folder(&folder.name, &parent_target, use_service).await {
                        Ok(new_id) => {
                            if let Err(e) = tasks.append_mapping(task_id, &folder.id, &new_id).await
                            {
                                return (folder.id, Err(e.into()));
                            }
                            (folder.id, Ok(Some(new_id)))
                        }
                        Err(e) => (folder.id, Err(e.into())),
                    }
                });
            }

            while let Some(joined) = level_jobs.join_next().await {
                let (source_folder, result) = joined
                    .map_err(|e| MirrorError::Internal(format!("folder job failed: {}", e)))?;
                match result {
                    Ok(Some(dest_folder)) => {
                        mapping.insert(source_folder, dest_folder);
                        created_total += 1;
                    }
                    Ok(None) => {}
                    Err(e) if e.cancels_siblings() => {
                        // Abort all further folder creation for this task;
                        // drain the level so in-flight jobs settle first.
                        cancel.cancel();
                        fatal = Some(e);
                    }
                    Err(e) => {
                        warn!(
                            folder = %source_folder,
                            error = %e,
                            "Folder creation failed; its contents fall back to the destination root"
                        );
                    }
                }
            }

            let pending = folders.iter().filter(|f| !mapping.contains_key(&f.id)).count();
            self.events.emit(MirrorEvent::Copy(CopyEvent::FolderProgress {
                task_id,
                created: created_total,
                pending: pending as u64,
            }));

            if fatal.is_none() {
                // Next level: folders whose source parent sat on this level.
                let level_ids: HashSet<&str> =
                    current.iter().map(|f| f.id.as_str()).collect();
                current = folders
                    .iter()
                    .filter(|f| level_ids.contains(f.parent_id.as_str()))
                    .cloned()
                    .collect();
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok((mapping, created_total)),
        }
    }

    /// Copies files through a fixed-size worker pool fed from a queue.
    ///
    /// The work list is consumed destructively while completions arrive
    /// asynchronously; on the first copy failure the remaining queue is
    /// abandoned (no further requests are issued), the error propagates, and
    /// the task ends up `error` rather than silently partial.
    async fn copy_files(
        &self,
        task_id: i64,
        files: Vec<Node>,
        mapping: Arc<HashMap<String, String>>,
        dest_root: &str,
        request: &CopyRequest,
    ) -> Result<u64> {
        if files.is_empty() {
            return Ok(0);
        }

        let total = files.len();
        let (queue_tx, queue_rx) = mpsc::channel::<Node>(total);
        for file in files {
            queue_tx
                .try_send(file)
                .map_err(|_| MirrorError::Internal("copy queue overflow".to_string()))?;
        }
        drop(queue_tx);
        let queue = Arc::new(Mutex::new(queue_rx));

        let copied = Arc::new(AtomicU64::new(0));
        let in_flight = Arc::new(AtomicU64::new(0));
        let pending = Arc::new(AtomicU64::new(total as u64));
        let first_error: Arc<Mutex<Option<MirrorError>>> = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();
        let ticker = self.spawn_file_progress_ticker(
            task_id,
            Arc::clone(&copied),
            Arc::clone(&in_flight),
            Arc::clone(&pending),
        );

        let workers = self.config.parallel_limit.min(total);
        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let api = Arc::clone(&self.api);
            let tasks = Arc::clone(&self.tasks);
            let hash_index = self.hash_index.clone();
            let mapping = Arc::clone(&mapping);
            let queue = Arc::clone(&queue);
            let copied = Arc::clone(&copied);
            let in_flight = Arc::clone(&in_flight);
            let pending = Arc::clone(&pending);
            let first_error = Arc::clone(&first_error);
            let cancel = cancel.clone();
            let dest_root = dest_root.to_string();
            let hash_substitution = request.hash_substitution;
            let use_service = request.use_service_identity;

            pool.spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let file = { queue.lock().await.recv().await };
                    let Some(file) = file else { break };
                    pending.fetch_sub(1, Ordering::Relaxed);
                    in_flight.fetch_add(1, Ordering::Relaxed);

                    let result = copy_one_file(
                        &*api,
                        &*tasks,
                        &hash_index,
                        &mapping,
                        &dest_root,
                        task_id,
                        &file,
                        hash_substitution,
                        use_service,
                    )
                    .await;

                    in_flight.fetch_sub(1, Ordering::Relaxed);
                    match result {
                        Ok(()) => {
                            copied.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            let mut slot = first_error.lock().await;
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            cancel.cancel();
                            break;
                        }
                    }
                }
            });
        }

        while pool.join_next().await.is_some() {}
        ticker.abort();

        if let Some(e) = first_error.lock().await.take() {
            return Err(e);
        }
        Ok(copied.load(Ordering::Relaxed))
    }

    fn spawn_file_progress_ticker(
        &self,
        task_id: i64,
        copied: Arc<AtomicU64>,
        in_flight: Arc<AtomicU64>,
        pending: Arc<AtomicU64>,
    ) -> tokio::task::JoinHandle<()> {
        let events = self.events.clone();
        let interval = self.config.progress_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                events.emit(MirrorEvent::Copy(CopyEvent::FileProgress {
                    task_id,
                    copied: copied.load(Ordering::Relaxed),
                    in_flight: in_flight.load(Ordering::Relaxed),
                    pending: pending.load(Ordering::Relaxed),
                }));
            }
        })
    }
}

/// Picks the object to copy for a file, consulting the hash index when
/// substitution is enabled. Substituting a reference to existing content
/// forces a service identity regardless of the caller's preference.
async fn resolve_copy_source(
    hash_index: &Option<Arc<dyn HashIndex>>,
    substitution_enabled: bool,
    file_id: &str,
    content_hash: Option<&str>,
    default_use_service: bool,
) -> Result<(String, bool)> {
    if substitution_enabled {
        if let (Some(index), Some(hash)) = (hash_index, content_hash) {
            if let Some(existing) = index.lookup(hash).await? {
                if existing != file_id {
                    return Ok((existing, true));
                }
            }
        }
    }
    Ok((file_id.to_string(), default_use_service))
}

#[allow(clippy::too_many_arguments)]
async fn copy_one_file(
    api: &dyn TreeApi,
    tasks: &dyn TaskStore,
    hash_index: &Option<Arc<dyn HashIndex>>,
    mapping: &HashMap<String, String>,
    dest_root: &str,
    task_id: i64,
    file: &Node,
    hash_substitution: bool,
    use_service: bool,
) -> Result<()> {
    let (copy_id, use_service) = resolve_copy_source(
        hash_index,
        hash_substitution,
        &file.id,
        file.content_hash.as_deref(),
        use_service,
    )
    .await?;

    let target = mapping
        .get(&file.parent_id)
        .map(String::as_str)
        .unwrap_or(dest_root);

    api.copy_object(&copy_id, target, use_service)
        .await
        .map_err(MirrorError::from)?;

    // Always the original source id: the completed-file log answers "has
    // this source file been replicated", independent of substitution.
    tasks.append_completed(task_id, &file.id).await?;
    Ok(())
}

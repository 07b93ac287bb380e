//! Recursive tree crawler.
//!
//! Discovers a folder tree's contents under one global concurrency bound:
//! every folder-listing job in the recursion competes for the same semaphore,
//! while pagination inside a single folder stays serial (the next page needs
//! the previous cursor). Fully listed folders are checkpointed write-through,
//! so a killed process leaves a resumable partial cache; folders whose
//! listing stalls after exhausted retries are reported back as unfinished and
//! their subtrees are skipped, never cached.

use core_runtime::config::MirrorConfig;
use core_runtime::events::{CrawlEvent, EventBus, MirrorEvent};
use core_store::repositories::checkpoint::CheckpointStore;
use provider_google_drive::{DriveError, ListOptions, TreeApi};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{MirrorError, Result};
use crate::summary::TreeSummary;
use crate::types::{node_from_remote, validate_fid, Node};

/// Options for one crawl.
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Ignore checkpointed listings and re-list every folder (the root's
    /// cached summary is cleared up front).
    pub refresh_all: bool,
    /// Request per-object modification times (tree snapshots).
    pub with_timestamps: bool,
    /// The tree lives outside shared drives.
    pub plain_folder: bool,
    /// Authenticate listings with service identities.
    pub use_service_identity: bool,
}

/// Result of a crawl.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    /// Flat listing of every discovered node (partial listings included).
    pub nodes: Vec<Node>,
    /// Folders whose listing could not be completed; their subtrees were not
    /// descended into and must be re-attempted on the next crawl.
    pub unfinished: Vec<String>,
    /// Aggregated statistics, present only when nothing was left unfinished.
    pub summary: Option<TreeSummary>,
}

/// Live counters behind the periodic progress events.
#[derive(Default)]
struct CrawlState {
    discovered: AtomicU64,
    in_flight: AtomicU64,
    queued: AtomicU64,
}

/// One settled folder-listing job.
struct FolderListing {
    folder_id: String,
    children: Vec<Node>,
    unfinished: bool,
}

/// Recursive crawler over a [`TreeApi`].
pub struct TreeCrawler {
    api: Arc<dyn TreeApi>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: MirrorConfig,
    events: EventBus,
}

impl TreeCrawler {
    pub fn new(
        api: Arc<dyn TreeApi>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: MirrorConfig,
        events: EventBus,
    ) -> Self {
        Self {
            api,
            checkpoints,
            config,
            events,
        }
    }

    /// Crawls the tree rooted at `root_id` and returns the flat node list
    /// plus the folders left unfinished.
    ///
    /// The checkpoint cache is a pure optimization: given unchanged remote
    /// state, crawling with any subset of folders pre-cached yields the same
    /// flat node set as crawling with an empty cache.
    pub async fn crawl(&self, root_id: &str, options: &CrawlOptions) -> Result<CrawlOutcome> {
        if !validate_fid(root_id) {
            return Err(MirrorError::InvalidId(root_id.to_string()));
        }

        if options.refresh_all {
            // A refresh must never leave a stale "complete" marker while the
            // re-listing is still under way.
            self.checkpoints.clear_summary(root_id).await?;
        }

        let state = Arc::new(CrawlState::default());
        let ticker = self.spawn_progress_ticker(Arc::clone(&state));
        let result = self.run(root_id, options, &state).await;
        ticker.abort();

        let (nodes, unfinished) = result?;
        self.events.emit(MirrorEvent::Crawl(CrawlEvent::Finished {
            discovered: nodes.len() as u64,
            unfinished_folders: unfinished.len() as u64,
        }));

        let summary = if unfinished.is_empty() {
            let summary = TreeSummary::from_nodes(&nodes);
            let json = summary
                .to_json()
                .map_err(|e| MirrorError::Internal(format!("summary serialization: {}", e)))?;
            self.checkpoints
                .set_summary(root_id, &json, chrono::Utc::now().timestamp_millis())
                .await?;
            info!(objects = nodes.len(), "Crawl complete, summary stored");
            Some(summary)
        } else {
            // An incomplete tree must never look cached-complete.
            warn!(
                unfinished = unfinished.len(),
                "Crawl finished with unread folders; no summary stored"
            );
            None
        };

        Ok(CrawlOutcome {
            nodes,
            unfinished,
            summary,
        })
    }

    async fn run(
        &self,
        root_id: &str,
        options: &CrawlOptions,
        state: &Arc<CrawlState>,
    ) -> Result<(Vec<Node>, Vec<String>)> {
        let semaphore = Arc::new(Semaphore::new(self.config.parallel_limit));
        let mut jobs: JoinSet<Result<FolderListing>> = JoinSet::new();
        let mut nodes = Vec::new();
        let mut unfinished = Vec::new();

        self.spawn_listing(&mut jobs, root_id.to_string(), options, state, &semaphore);

        while let Some(joined) = jobs.join_next().await {
            let listing = joined
                .map_err(|e| MirrorError::Internal(format!("listing job failed: {}", e)))??;

            state
                .discovered
                .fetch_add(listing.children.len() as u64, Ordering::Relaxed);

            if listing.unfinished {
                unfinished.push(listing.folder_id.clone());
            } else {
                // Recursion fans out only into folder children of complete
                // listings; a partial listing's subtree stays unexplored.
                for child in listing.children.iter().filter(|c| c.is_folder()) {
                    self.spawn_listing(&mut jobs, child.id.clone(), options, state, &semaphore);
                }
            }
            nodes.extend(listing.children);
        }
        // Dropping the JoinSet aborts whatever is still queued if an error
        // broke the loop above via `?`.

        debug!(
            objects = nodes.len(),
            unfinished = unfinished.len(),
            "Crawl recursion settled"
        );
        Ok((nodes, unfinished))
    }

    fn spawn_listing(
        &self,
        jobs: &mut JoinSet<Result<FolderListing>>,
        folder_id: String,
        options: &CrawlOptions,
        state: &Arc<CrawlState>,
        semaphore: &Arc<Semaphore>,
    ) {
        let api = Arc::clone(&self.api);
        let checkpoints = Arc::clone(&self.checkpoints);
        let options = options.clone();
        let state = Arc::clone(state);
        let semaphore = Arc::clone(semaphore);

        state.queued.fetch_add(1, Ordering::Relaxed);
        jobs.spawn(async move {
            list_folder(api, checkpoints, folder_id, options, state, semaphore).await
        });
    }

    fn spawn_progress_ticker(&self, state: Arc<CrawlState>) -> tokio::task::JoinHandle<()> {
        let events = self.events.clone();
        let interval = self.config.progress_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                events.emit(MirrorEvent::Crawl(CrawlEvent::Progress {
                    discovered: state.discovered.load(Ordering::Relaxed),
                    in_flight: state.in_flight.load(Ordering::Relaxed),
                    queued: state.queued.load(Ordering::Relaxed),
                }));
            }
        })
    }
}

/// Lists one folder: from the checkpoint cache when permitted, otherwise
/// remotely page by page under a semaphore permit held for the whole folder.
async fn list_folder(
    api: Arc<dyn TreeApi>,
    checkpoints: Arc<dyn CheckpointStore>,
    folder_id: String,
    options: CrawlOptions,
    state: Arc<CrawlState>,
    semaphore: Arc<Semaphore>,
) -> Result<FolderListing> {
    if !options.refresh_all {
        if let Some(record) = checkpoints.get(&folder_id).await? {
            // Cached rows exist only for complete listings.
            state.queued.fetch_sub(1, Ordering::Relaxed);
            return Ok(FolderListing {
                folder_id,
                children: record.children,
                unfinished: false,
            });
        }
    }

    let permit = semaphore
        .acquire_owned()
        .await
        .map_err(|_| MirrorError::Internal("listing pool closed".to_string()))?;
    state.queued.fetch_sub(1, Ordering::Relaxed);
    state.in_flight.fetch_add(1, Ordering::Relaxed);

    let list_options = ListOptions {
        with_timestamps: options.with_timestamps,
        plain_folder: options.plain_folder,
        use_service_identity: options.use_service_identity,
    };

    let mut children: Vec<Node> = Vec::new();
    let mut page_token = None;
    let mut unfinished = false;

    loop {
        match api
            .list_children_page(&folder_id, page_token.take(), &list_options)
            .await
        {
            Ok(page) => {
                children.extend(
                    page.children
                        .into_iter()
                        .map(|object| node_from_remote(object, &folder_id)),
                );
                match page.next_page_token {
                    Some(token) => page_token = Some(token),
                    None => break,
                }
            }
            Err(
                DriveError::RetriesExhausted { .. }
                | DriveError::NotFound
                | DriveError::PermissionDenied { .. },
            ) => {
                // Partial children still count; the folder is reported as
                // unfinished and re-attempted on the next crawl.
                warn!(folder_id = %folder_id, "Folder listing incomplete");
                unfinished = true;
                break;
            }
            Err(fatal) => {
                state.in_flight.fetch_sub(1, Ordering::Relaxed);
                return Err(fatal.into());
            }
        }
    }

    state.in_flight.fetch_sub(1, Ordering::Relaxed);
    drop(permit);

    if !unfinished {
        let subfolder_ids: Vec<String> = children
            .iter()
            .filter(|c| c.is_folder())
            .map(|c| c.id.clone())
            .collect();
        // Write-through per folder: a killed process keeps every listing
        // that finished. Unfinished folders are never written, so a stale
        // cache row (if any) survives untouched.
        checkpoints.upsert(&folder_id, &children, &subfolder_ids).await?;
    }

    Ok(FolderListing {
        folder_id,
        children,
        unfinished,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeTree, Failure};
    use core_store::{create_test_pool, SqliteCheckpointRepository};
    use std::collections::BTreeSet;

    async fn checkpoints() -> Arc<SqliteCheckpointRepository> {
        Arc::new(SqliteCheckpointRepository::new(
            create_test_pool().await.unwrap(),
        ))
    }

    fn crawler(api: Arc<FakeTree>, checkpoints: Arc<SqliteCheckpointRepository>) -> TreeCrawler {
        let config = MirrorConfig::builder().parallel_limit(4).build().unwrap();
        TreeCrawler::new(api, checkpoints, config, EventBus::new(64))
    }

    /// root ── f1, d1 ── f2, d2 ── f3
    fn seed_small_tree(api: &FakeTree) {
        api.add_root("rootfolder0", "Root");
        api.add_file("file000001", "a.bin", "rootfolder0", 10, Some("h1"));
        api.add_folder("folder0001", "d1", "rootfolder0");
        api.add_file("file000002", "b.bin", "folder0001", 20, Some("h2"));
        api.add_folder("folder0002", "d2", "folder0001");
        api.add_file("file000003", "c.bin", "folder0002", 30, Some("h3"));
    }

    fn ids(nodes: &[Node]) -> BTreeSet<String> {
        nodes.iter().map(|n| n.id.clone()).collect()
    }

    #[tokio::test]
    async fn crawl_discovers_the_whole_tree_and_stores_summary() {
        let api = Arc::new(FakeTree::new());
        seed_small_tree(&api);
        let checkpoints = checkpoints().await;
        let crawler = crawler(api.clone(), checkpoints.clone());

        let outcome = crawler
            .crawl("rootfolder0", &CrawlOptions::default())
            .await
            .unwrap();

        assert_eq!(
            ids(&outcome.nodes),
            ["file000001", "file000002", "file000003", "folder0001", "folder0002"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        );
        assert!(outcome.unfinished.is_empty());

        let summary = outcome.summary.unwrap();
        assert_eq!(summary.file_count, 3);
        assert_eq!(summary.folder_count, 2);
        assert_eq!(summary.total_size, 60);

        // Write-through: every fully listed folder has a cache row, and the
        // root row carries the summary.
        let root = checkpoints.get("rootfolder0").await.unwrap().unwrap();
        assert!(root.summary.is_some());
        assert!(checkpoints.get("folder0001").await.unwrap().is_some());
        assert!(checkpoints.get("folder0002").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn nodes_are_stamped_with_their_listing_folder() {
        let api = Arc::new(FakeTree::new());
        seed_small_tree(&api);
        let crawler = crawler(api, checkpoints().await);

        let outcome = crawler
            .crawl("rootfolder0", &CrawlOptions::default())
            .await
            .unwrap();
        let by_id: std::collections::HashMap<_, _> =
            outcome.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        assert_eq!(by_id["file000001"].parent_id, "rootfolder0");
        assert_eq!(by_id["file000002"].parent_id, "folder0001");
        assert_eq!(by_id["file000003"].parent_id, "folder0002");
    }

    #[tokio::test]
    async fn pagination_is_serial_within_a_folder() {
        let api = Arc::new(FakeTree::with_page_size(2));
        api.add_root("rootfolder0", "Root");
        for i in 0..5 {
            api.add_file(
                &format!("file-page-{:02}", i),
                &format!("{}.bin", i),
                "rootfolder0",
                1,
                None,
            );
        }
        let crawler = crawler(api.clone(), checkpoints().await);

        let outcome = crawler
            .crawl("rootfolder0", &CrawlOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.nodes.len(), 5);
        assert_eq!(
            api.calls_with_prefix("list rootfolder0"),
            vec!["list rootfolder0:0", "list rootfolder0:1", "list rootfolder0:2"]
        );
    }

    #[tokio::test]
    async fn unfinished_folder_blocks_summary_and_recursion() {
        let api = Arc::new(FakeTree::new());
        seed_small_tree(&api);
        api.fail_listing("folder0001", Failure::RetriesExhausted);
        let checkpoints = checkpoints().await;
        let crawler = crawler(api.clone(), checkpoints.clone());

        let outcome = crawler
            .crawl("rootfolder0", &CrawlOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.unfinished, vec!["folder0001"]);
        assert!(outcome.summary.is_none());
        // d1's subtree was never descended into.
        assert!(api.calls_with_prefix("list folder0002").is_empty());
        // The unfinished folder was never cached; the root (complete) was.
        assert!(checkpoints.get("folder0001").await.unwrap().is_none());
        let root = checkpoints.get("rootfolder0").await.unwrap().unwrap();
        assert!(root.summary.is_none());
    }

    #[tokio::test]
    async fn unfinished_folder_keeps_its_stale_cache_row() {
        let api = Arc::new(FakeTree::new());
        seed_small_tree(&api);
        let checkpoints = checkpoints().await;

        // First crawl caches everything.
        crawler(api.clone(), checkpoints.clone())
            .crawl("rootfolder0", &CrawlOptions::default())
            .await
            .unwrap();
        let cached_before = checkpoints.get("folder0001").await.unwrap().unwrap();

        // Refresh crawl with d1 now failing: stale-but-valid beats data loss.
        api.fail_listing("folder0001", Failure::RetriesExhausted);
        let outcome = crawler(api.clone(), checkpoints.clone())
            .crawl(
                "rootfolder0",
                &CrawlOptions {
                    refresh_all: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.unfinished, vec!["folder0001"]);
        let cached_after = checkpoints.get("folder0001").await.unwrap().unwrap();
        assert_eq!(cached_before.children, cached_after.children);
    }

    #[tokio::test]
    async fn cached_crawl_equals_fresh_crawl_without_remote_calls() {
        let api = Arc::new(FakeTree::new());
        seed_small_tree(&api);
        let checkpoints = checkpoints().await;

        let fresh = crawler(api.clone(), checkpoints.clone())
            .crawl("rootfolder0", &CrawlOptions::default())
            .await
            .unwrap();
        let listings_after_fresh = api.calls_with_prefix("list").len();

        let cached = crawler(api.clone(), checkpoints.clone())
            .crawl("rootfolder0", &CrawlOptions::default())
            .await
            .unwrap();

        assert_eq!(ids(&fresh.nodes), ids(&cached.nodes));
        // The cache is a pure optimization: second crawl issued no listings.
        assert_eq!(api.calls_with_prefix("list").len(), listings_after_fresh);
    }

    #[tokio::test]
    async fn partially_cached_crawl_yields_the_same_node_set() {
        let api = Arc::new(FakeTree::new());
        seed_small_tree(&api);
        let pool = create_test_pool().await.unwrap();
        let checkpoints = Arc::new(SqliteCheckpointRepository::new(pool.clone()));

        let fresh = crawler(api.clone(), checkpoints.clone())
            .crawl("rootfolder0", &CrawlOptions::default())
            .await
            .unwrap();

        // Drop one folder's row: only that folder gets re-listed.
        sqlx::query("DELETE FROM folder_cache WHERE folder_id = 'folder0001'")
            .execute(&pool)
            .await
            .unwrap();

        let partially_cached = crawler(api.clone(), checkpoints.clone())
            .crawl("rootfolder0", &CrawlOptions::default())
            .await
            .unwrap();
        assert_eq!(ids(&fresh.nodes), ids(&partially_cached.nodes));
    }

    #[tokio::test]
    async fn refresh_all_ignores_the_cache() {
        let api = Arc::new(FakeTree::new());
        seed_small_tree(&api);
        let checkpoints = checkpoints().await;

        crawler(api.clone(), checkpoints.clone())
            .crawl("rootfolder0", &CrawlOptions::default())
            .await
            .unwrap();
        let listings_first = api.calls_with_prefix("list").len();

        crawler(api.clone(), checkpoints.clone())
            .crawl(
                "rootfolder0",
                &CrawlOptions {
                    refresh_all: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(api.calls_with_prefix("list").len(), listings_first * 2);
    }

    #[tokio::test]
    async fn inaccessible_subfolder_is_recorded_not_fatal() {
        let api = Arc::new(FakeTree::new());
        seed_small_tree(&api);
        api.fail_listing("folder0001", Failure::NotFound);
        let crawler = crawler(api, checkpoints().await);

        let outcome = crawler
            .crawl("rootfolder0", &CrawlOptions::default())
            .await
            .unwrap();
        // The rest of the tree is still reported.
        assert!(outcome.nodes.iter().any(|n| n.id == "file000001"));
        assert_eq!(outcome.unfinished, vec!["folder0001"]);
        assert!(outcome.summary.is_none());
    }

    #[tokio::test]
    async fn capacity_failure_aborts_the_crawl() {
        let api = Arc::new(FakeTree::new());
        seed_small_tree(&api);
        api.fail_listing("folder0001", Failure::Capacity);
        let crawler = crawler(api, checkpoints().await);

        let err = crawler
            .crawl("rootfolder0", &CrawlOptions::default())
            .await
            .unwrap_err();
        assert!(err.cancels_siblings());
    }

    #[tokio::test]
    async fn invalid_root_id_is_rejected_before_any_call() {
        let api = Arc::new(FakeTree::new());
        let crawler = crawler(api.clone(), checkpoints().await);

        let err = crawler.crawl("bad id!", &CrawlOptions::default()).await.unwrap_err();
        assert!(matches!(err, MirrorError::InvalidId(_)));
        assert!(api.calls().is_empty());
    }
}

//! Duplicate detection and cleanup.
//!
//! Operates on a single flat snapshot, never the live tree. Two passes:
//! files sharing `(parent, content hash)` beyond the first seen are
//! duplicates; folders sharing `(parent, name)` are duplicates only when the
//! whole group is empty, in which case all but one are reported (merging
//! non-empty folders is out of scope, so a group containing any non-empty
//! member is left alone entirely).

use core_runtime::config::MirrorConfig;
use provider_google_drive::TreeApi;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::crawler::{CrawlOptions, TreeCrawler};
use crate::error::{MirrorError, Result};
use crate::types::Node;

/// Duplicates found in one snapshot.
#[derive(Debug, Clone, Default)]
pub struct DedupReport {
    pub duplicate_files: Vec<Node>,
    pub duplicate_empty_folders: Vec<Node>,
}

impl DedupReport {
    pub fn is_empty(&self) -> bool {
        self.duplicate_files.is_empty() && self.duplicate_empty_folders.is_empty()
    }

    pub fn total(&self) -> usize {
        self.duplicate_files.len() + self.duplicate_empty_folders.len()
    }
}

/// Counts of objects actually moved to trash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DedupStats {
    pub files_trashed: u64,
    pub folders_trashed: u64,
}

/// Finds duplicate files and duplicate empty folders in a flat snapshot.
///
/// Files without a content hash are skipped: identity cannot be judged
/// without one.
pub fn find_duplicates(nodes: &[Node]) -> DedupReport {
    let mut report = DedupReport::default();

    // Pass 1: files by (parent, content hash); every file beyond the first
    // seen per group is a duplicate.
    let mut seen_files: HashSet<(String, String)> = HashSet::new();
    for node in nodes.iter().filter(|n| !n.is_folder()) {
        let Some(hash) = &node.content_hash else {
            continue;
        };
        let key = (node.parent_id.clone(), hash.clone());
        if !seen_files.insert(key) {
            report.duplicate_files.push(node.clone());
        }
    }

    // Pass 2: folders by (parent, name). Only fully-empty groups are
    // touched; the first member is kept.
    let parents_with_children: HashSet<&str> =
        nodes.iter().map(|n| n.parent_id.as_str()).collect();
    let mut folder_groups: HashMap<(String, String), Vec<&Node>> = HashMap::new();
    for node in nodes.iter().filter(|n| n.is_folder()) {
        folder_groups
            .entry((node.parent_id.clone(), node.name.clone()))
            .or_default()
            .push(node);
    }
    for group in folder_groups.into_values() {
        if group.len() < 2 {
            continue;
        }
        let any_non_empty = group
            .iter()
            .any(|folder| parents_with_children.contains(folder.id.as_str()));
        if any_non_empty {
            continue;
        }
        report
            .duplicate_empty_folders
            .extend(group.into_iter().skip(1).cloned());
    }

    report
}

/// Asked before anything is deleted, with the counts that would be removed.
#[async_trait::async_trait]
pub trait DedupDecider: Send + Sync {
    async fn confirm(&self, duplicate_files: usize, duplicate_folders: usize) -> bool;
}

/// Always confirms; for unattended contexts that passed an explicit flag.
pub struct AutoConfirm;

#[async_trait::async_trait]
impl DedupDecider for AutoConfirm {
    async fn confirm(&self, _duplicate_files: usize, _duplicate_folders: usize) -> bool {
        true
    }
}

/// Crawl-then-trash dedup flow.
pub struct Deduper {
    api: Arc<dyn TreeApi>,
    crawler: TreeCrawler,
    config: MirrorConfig,
}

impl Deduper {
    pub fn new(api: Arc<dyn TreeApi>, crawler: TreeCrawler, config: MirrorConfig) -> Self {
        Self {
            api,
            crawler,
            config,
        }
    }

    /// Finds duplicates under `root_id` and, once confirmed, moves them to
    /// trash (never a permanent erase). Returns `Ok(None)` when the decider
    /// declines.
    ///
    /// Per-item trash failures are logged and skipped; deletion is a cleanup
    /// pass, not a transaction.
    pub async fn dedupe(
        &self,
        root_id: &str,
        options: &CrawlOptions,
        decider: &dyn DedupDecider,
    ) -> Result<Option<DedupStats>> {
        let crawl = self.crawler.crawl(root_id, options).await?;
        let report = find_duplicates(&crawl.nodes);

        if !decider
            .confirm(
                report.duplicate_files.len(),
                report.duplicate_empty_folders.len(),
            )
            .await
        {
            info!("Dedup declined, nothing deleted");
            return Ok(None);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.parallel_limit));
        let use_service = options.use_service_identity;
        let mut jobs: JoinSet<(bool, bool)> = JoinSet::new();

        for node in report
            .duplicate_files
            .into_iter()
            .chain(report.duplicate_empty_folders.into_iter())
        {
            let api = Arc::clone(&self.api);
            let semaphore = Arc::clone(&semaphore);
            jobs.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (node.is_folder(), false);
                };
                match api.trash_object(&node.id, use_service).await {
                    Ok(()) => (node.is_folder(), true),
                    Err(e) => {
                        warn!(id = %node.id, name = %node.name, error = %e, "Failed to trash duplicate");
                        (node.is_folder(), false)
                    }
                }
            });
        }

        let mut stats = DedupStats::default();
        while let Some(joined) = jobs.join_next().await {
            let (is_folder, trashed) = joined
                .map_err(|e| MirrorError::Internal(format!("trash job failed: {}", e)))?;
            if trashed {
                if is_folder {
                    stats.folders_trashed += 1;
                } else {
                    stats.files_trashed += 1;
                }
            }
        }

        info!(
            files = stats.files_trashed,
            folders = stats.folders_trashed,
            "Dedup complete"
        );
        Ok(Some(stats))
    }
}

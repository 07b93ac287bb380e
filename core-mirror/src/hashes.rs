//! Hash index population.

use core_store::repositories::hash_index::HashIndex;
use tracing::info;

use crate::crawler::{CrawlOptions, TreeCrawler};
use crate::error::Result;
use crate::types::Node;

/// Crawls a tree and records every hashed file in the hash index, so later
/// copies can substitute references to content that already exists remotely.
///
/// Files below `min_size` (when given) are skipped; ids already indexed are
/// left untouched. Returns the number of entries added.
pub async fn save_hashes(
    crawler: &TreeCrawler,
    index: &dyn HashIndex,
    root_id: &str,
    options: &CrawlOptions,
    min_size: Option<u64>,
) -> Result<u64> {
    let crawl = crawler.crawl(root_id, options).await?;

    let eligible: Vec<Node> = crawl
        .nodes
        .into_iter()
        .filter(|n| !n.is_folder())
        .filter(|n| min_size.map_or(true, |min| n.size >= min))
        .collect();

    let added = index.index_nodes(&eligible).await?;
    info!(added, root_id, "Hash index updated");
    Ok(added)
}

//! Aggregated tree statistics.
//!
//! Computed over a complete flat snapshot and stored against the crawl root;
//! an incomplete tree never gets a summary, so a stored summary always means
//! "fully read as of its timestamp".

use crate::types::{Node, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-extension rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionStat {
    pub ext: String,
    pub count: u64,
    pub size: u64,
}

/// Aggregated statistics for one tree snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSummary {
    pub file_count: u64,
    pub folder_count: u64,
    pub total_size: u64,
    /// Largest-first per-extension breakdown.
    pub extensions: Vec<ExtensionStat>,
}

/// Extension bucket for files without one.
const NO_EXTENSION: &str = "other";

impl TreeSummary {
    pub fn from_nodes(nodes: &[Node]) -> Self {
        let mut buckets: HashMap<String, ExtensionStat> = HashMap::new();
        let mut file_count = 0;
        let mut folder_count = 0;
        let mut total_size = 0;

        for node in nodes {
            match node.kind {
                NodeKind::Folder => folder_count += 1,
                NodeKind::File => {
                    file_count += 1;
                    total_size += node.size;
                    let ext = extension_of(&node.name);
                    let stat = buckets.entry(ext.clone()).or_insert(ExtensionStat {
                        ext,
                        count: 0,
                        size: 0,
                    });
                    stat.count += 1;
                    stat.size += node.size;
                }
            }
        }

        let mut extensions: Vec<_> = buckets.into_values().collect();
        extensions.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.ext.cmp(&b.ext)));

        Self {
            file_count,
            folder_count,
            total_size,
            extensions,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_lowercase(),
        _ => NO_EXTENSION.to_string(),
    }
}

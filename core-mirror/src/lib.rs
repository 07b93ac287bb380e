//! # Mirror engine
//!
//! The resumable, concurrency-bounded tree replication engine:
//!
//! - [`TreeCrawler`]: recursively lists a remote folder tree under one shared
//!   concurrency bound, reusing checkpointed listings and reporting folders
//!   it could not finish reading
//! - [`CopyOrchestrator`]: replays a source tree's folder structure
//!   breadth-first at a destination, then copies files with bounded
//!   concurrency, persisting an id-mapping and a completed-file log so the
//!   operation survives crashes and resumes without duplicate work
//! - [`find_duplicates`] / [`Deduper`]: duplicate files (same parent +
//!   content hash) and duplicate empty folders (same parent + name)
//! - [`shutdown`]: flips in-flight tasks to `interrupted` on process
//!   termination

pub mod copier;
pub mod crawler;
pub mod dedupe;
pub mod error;
pub mod hashes;
pub mod shutdown;
pub mod summary;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use copier::{
    AutoContinue, CopyOrchestrator, CopyOutcome, CopyRequest, ResumeChoice, ResumeDecider,
};
pub use crawler::{CrawlOptions, CrawlOutcome, TreeCrawler};
pub use dedupe::{find_duplicates, AutoConfirm, DedupDecider, DedupReport, DedupStats, Deduper};
pub use error::{MirrorError, Result};
pub use hashes::save_hashes;
pub use summary::{ExtensionStat, TreeSummary};
pub use types::{node_from_remote, validate_fid, Node, NodeKind};

//! # Event Bus
//!
//! Typed progress events over `tokio::sync::broadcast`. The crawler and copy
//! orchestrator emit here instead of rendering anything themselves; hosts
//! (bots, CLIs, log shippers) subscribe and format as they please.
//!
//! Emitting to a bus with no subscribers is not an error; progress is
//! best-effort observability, never control flow.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::events::{EventBus, MirrorEvent, CrawlEvent};
//!
//! let bus = EventBus::new(100);
//! let mut stream = bus.subscribe();
//! bus.emit(MirrorEvent::Crawl(CrawlEvent::Progress {
//!     discovered: 12,
//!     in_flight: 3,
//!     queued: 7,
//! }));
//! ```

use serde::Serialize;
use tokio::sync::broadcast;

/// Crawl lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CrawlEvent {
    /// Periodic snapshot of the crawl frontier.
    Progress {
        /// Objects discovered so far.
        discovered: u64,
        /// Listing requests currently in flight.
        in_flight: u64,
        /// Folder listings waiting for a concurrency slot.
        queued: u64,
    },
    /// The recursion settled.
    Finished {
        discovered: u64,
        unfinished_folders: u64,
    },
}

/// Copy lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CopyEvent {
    Started {
        task_id: i64,
        folders_total: u64,
        files_total: u64,
    },
    FolderProgress {
        task_id: i64,
        created: u64,
        pending: u64,
    },
    FileProgress {
        task_id: i64,
        copied: u64,
        in_flight: u64,
        pending: u64,
    },
    Finished {
        task_id: i64,
    },
    Failed {
        task_id: i64,
        message: String,
    },
}

/// Credential pool events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AuthEvent {
    /// A service identity failed to refresh and left the pool.
    IdentityEvicted { identity: String },
    /// The pool was reloaded from the catalog (batch refill or timer).
    PoolReloaded { live_identities: usize },
}

/// Top-level event type published on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MirrorEvent {
    Crawl(CrawlEvent),
    Copy(CopyEvent),
    Auth(AuthEvent),
}

/// Broadcast bus for [`MirrorEvent`]s.
///
/// Cloning is cheap; all clones share one channel. Slow subscribers may lag
/// and miss events (broadcast semantics), which is acceptable for progress
/// reporting.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MirrorEvent>,
}

impl EventBus {
    /// Creates a bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event. Returns the number of subscribers that will see
    /// it; zero subscribers is not an error.
    pub fn emit(&self, event: MirrorEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MirrorEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

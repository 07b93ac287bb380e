//! # Core Runtime
//!
//! Shared runtime services for the drive mirror workspace: configuration,
//! logging initialization, and the event bus that crawl/copy operations use
//! to publish progress.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{MirrorConfig, MirrorConfigBuilder};
pub use error::{Error, Result};
pub use events::{AuthEvent, CopyEvent, CrawlEvent, EventBus, MirrorEvent};
pub use logging::{init_logging, LogFormat, LoggingConfig};

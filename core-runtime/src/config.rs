//! # Mirror Configuration
//!
//! Tunables for the crawl/copy engine, constructed through a validating
//! builder so misconfiguration fails fast with an actionable message.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::MirrorConfig;
//! use std::time::Duration;
//!
//! let config = MirrorConfig::builder()
//!     .parallel_limit(50)
//!     .timeout_base(Duration::from_secs(5))
//!     .build()
//!     .expect("valid config");
//! assert_eq!(config.parallel_limit, 50);
//! ```

use crate::error::{Error, Result};
use std::time::Duration;

/// Default number of concurrent in-flight remote requests per pool.
pub const DEFAULT_PARALLEL_LIMIT: usize = 20;

/// Default number of attempts per logical remote call.
pub const DEFAULT_RETRY_LIMIT: u32 = 7;

/// Default initial per-request timeout; doubles per failed attempt.
pub const DEFAULT_TIMEOUT_BASE: Duration = Duration::from_secs(7);

/// Ceiling for the doubling per-request timeout.
pub const DEFAULT_TIMEOUT_MAX: Duration = Duration::from_secs(60);

/// Listing page size. The remote API caps pages at 1000 entries.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Remote hard cap on the listing page size.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// How many service identities are loaded from the catalog per batch.
pub const DEFAULT_IDENTITY_BATCH_SIZE: usize = 1000;

/// Service-identity tokens are treated as expired this long before their
/// reported expiry. The primary-account token carries no margin because the
/// token endpoint reports its exact lifetime.
pub const DEFAULT_TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// In server mode, the credential pool is discarded and reloaded from the
/// first catalog batch on this interval.
pub const DEFAULT_POOL_RELOAD_INTERVAL: Duration = Duration::from_secs(2 * 3600);

/// Cadence of crawl/copy progress events.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Engine configuration shared by the credential pool, request executor,
/// crawler, and copy orchestrator.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Concurrent in-flight remote requests per bounded pool (crawl and copy
    /// each hold their own pool of this size).
    pub parallel_limit: usize,

    /// Attempts per logical remote call before giving up.
    pub retry_limit: u32,

    /// Initial per-request timeout.
    pub timeout_base: Duration,

    /// Maximum per-request timeout after doubling.
    pub timeout_max: Duration,

    /// Listing page size, clamped to [`MAX_PAGE_SIZE`].
    pub page_size: u32,

    /// Service identities loaded from the catalog per batch.
    pub identity_batch_size: usize,

    /// Early-expiry margin for service-identity tokens.
    pub token_expiry_margin: Duration,

    /// Credential pool full-reload interval (server mode only).
    pub pool_reload_interval: Duration,

    /// Cadence of progress events.
    pub progress_interval: Duration,

    /// Log expected transient failures (timeouts, service rate limits) at
    /// warn level instead of suppressing them to debug.
    pub verbose: bool,

    /// Long-running unattended context: interrupted tasks auto-continue and
    /// the credential pool reload timer runs.
    pub server_mode: bool,

    /// Fallback destination root when a copy request omits the target.
    pub default_target: Option<String>,
}

impl MirrorConfig {
    pub fn builder() -> MirrorConfigBuilder {
        MirrorConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallel_limit == 0 {
            return Err(Error::Config(
                "parallel_limit must be greater than 0".to_string(),
            ));
        }
        if self.retry_limit == 0 {
            return Err(Error::Config(
                "retry_limit must be greater than 0".to_string(),
            ));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "page_size must be in 1..={}",
                MAX_PAGE_SIZE
            )));
        }
        if self.timeout_base > self.timeout_max {
            return Err(Error::Config(
                "timeout_base must not exceed timeout_max".to_string(),
            ));
        }
        if self.identity_batch_size == 0 {
            return Err(Error::Config(
                "identity_batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            parallel_limit: DEFAULT_PARALLEL_LIMIT,
            retry_limit: DEFAULT_RETRY_LIMIT,
            timeout_base: DEFAULT_TIMEOUT_BASE,
            timeout_max: DEFAULT_TIMEOUT_MAX,
            page_size: DEFAULT_PAGE_SIZE,
            identity_batch_size: DEFAULT_IDENTITY_BATCH_SIZE,
            token_expiry_margin: DEFAULT_TOKEN_EXPIRY_MARGIN,
            pool_reload_interval: DEFAULT_POOL_RELOAD_INTERVAL,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            verbose: false,
            server_mode: false,
            default_target: None,
        }
    }
}

/// Builder for [`MirrorConfig`].
#[derive(Default)]
pub struct MirrorConfigBuilder {
    config: MirrorConfig,
}

impl MirrorConfigBuilder {
    pub fn parallel_limit(mut self, limit: usize) -> Self {
        self.config.parallel_limit = limit;
        self
    }

    pub fn retry_limit(mut self, limit: u32) -> Self {
        self.config.retry_limit = limit;
        self
    }

    pub fn timeout_base(mut self, timeout: Duration) -> Self {
        self.config.timeout_base = timeout;
        self
    }

    pub fn timeout_max(mut self, timeout: Duration) -> Self {
        self.config.timeout_max = timeout;
        self
    }

    /// Sets the listing page size. Values above the remote cap are clamped.
    pub fn page_size(mut self, size: u32) -> Self {
        self.config.page_size = size.min(MAX_PAGE_SIZE);
        self
    }

    pub fn identity_batch_size(mut self, size: usize) -> Self {
        self.config.identity_batch_size = size;
        self
    }

    pub fn token_expiry_margin(mut self, margin: Duration) -> Self {
        self.config.token_expiry_margin = margin;
        self
    }

    pub fn pool_reload_interval(mut self, interval: Duration) -> Self {
        self.config.pool_reload_interval = interval;
        self
    }

    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.config.progress_interval = interval;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    pub fn server_mode(mut self, server_mode: bool) -> Self {
        self.config.server_mode = server_mode;
        self
    }

    pub fn default_target(mut self, target: impl Into<String>) -> Self {
        self.config.default_target = Some(target.into());
        self
    }

    /// Builds the final config, validating all invariants.
    pub fn build(self) -> Result<MirrorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

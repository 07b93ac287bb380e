//! Request executor: one logical remote call with bounded retry.
//!
//! Each attempt acquires a fresh bearer token from the credential pool (a
//! different random identity is likely drawn on each service-identity
//! attempt), issues the call with a timeout that starts at the configured
//! base and doubles per failed attempt up to the maximum, and classifies the
//! outcome:
//!
//! - transport failures and timeouts are retried;
//! - a rate-limit response is fatal (`QuotaExceeded`) for the primary
//!   identity and retried for service identities;
//! - an object-count limit response is always fatal (`CapacityExceeded`);
//! - 404/403 are fatal to the call;
//! - exhausted attempts surface as `RetriesExhausted`, which listing callers
//!   convert into the "unfinished folder" condition.

use bridge_http::{HttpClient, HttpError, HttpRequest, HttpResponse};
use core_auth::CredentialPool;
use core_runtime::config::MirrorConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::{DriveError, Result};
use crate::types::ApiErrorBody;

/// How a non-success response should be handled.
#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    RateLimited(String),
    Capacity(String),
    NotFound,
    PermissionDenied(String),
    Retryable(u16, String),
    Fatal(u16, String),
}

/// Classifies a non-2xx response from its status and error body.
fn classify(status: u16, body: &str) -> Disposition {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());
    let lowered = message.to_lowercase();

    if lowered.contains("file limit") {
        return Disposition::Capacity(message);
    }
    if status == 429 || lowered.contains("rate limit") {
        return Disposition::RateLimited(message);
    }
    match status {
        404 => Disposition::NotFound,
        403 => Disposition::PermissionDenied(message),
        500..=599 => Disposition::Retryable(status, message),
        _ => Disposition::Fatal(status, message),
    }
}

/// Issues one logical remote call with timeout/backoff/retry and bearer
/// injection.
pub struct RequestExecutor {
    http: Arc<dyn HttpClient>,
    pool: Arc<CredentialPool>,
    retry_limit: u32,
    timeout_base: Duration,
    timeout_max: Duration,
    verbose: bool,
}

impl RequestExecutor {
    pub fn new(http: Arc<dyn HttpClient>, pool: Arc<CredentialPool>, config: &MirrorConfig) -> Self {
        Self {
            http,
            pool,
            retry_limit: config.retry_limit,
            timeout_base: config.timeout_base,
            timeout_max: config.timeout_max,
            verbose: config.verbose,
        }
    }

    /// Executes the request produced by `build` until it succeeds or the
    /// retry budget is spent. `build` is called once per attempt so cursor
    /// and query state stay fresh.
    pub async fn execute<F>(&self, build: F, use_service_identity: bool) -> Result<HttpResponse>
    where
        F: Fn() -> HttpRequest + Send + Sync,
    {
        let mut timeout = self.timeout_base;
        let mut last_failure = String::new();

        for attempt in 1..=self.retry_limit {
            // Token acquisition failures (including an exhausted catalog)
            // are fatal: no token, no forward progress.
            let token = self.pool.acquire(use_service_identity).await?;
            let request = build().bearer_token(&token).timeout(timeout);

            match self.http.execute(request).await {
                Ok(response) if response.is_success() => {
                    debug!(attempt, "Remote call succeeded");
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status;
                    match classify(status, &response.text()) {
                        Disposition::Capacity(message) => {
                            error!(status, %message, "Destination object limit exceeded");
                            return Err(DriveError::CapacityExceeded { message });
                        }
                        Disposition::RateLimited(message) => {
                            if !use_service_identity {
                                return Err(DriveError::QuotaExceeded { message });
                            }
                            // A different random identity is drawn next
                            // attempt, so this is worth retrying.
                            self.log_transient(attempt, status, &message);
                            last_failure = format!("rate limited (status {})", status);
                        }
                        Disposition::NotFound => return Err(DriveError::NotFound),
                        Disposition::PermissionDenied(message) => {
                            return Err(DriveError::PermissionDenied { message });
                        }
                        Disposition::Retryable(status, message) => {
                            warn!(attempt, status, %message, "Retryable API error");
                            last_failure = format!("status {}: {}", status, message);
                        }
                        Disposition::Fatal(status, message) => {
                            warn!(status, %message, "Non-retryable API error");
                            return Err(DriveError::Api { status, message });
                        }
                    }
                }
                Err(HttpError::Timeout) => {
                    self.log_transient(attempt, 0, "request timed out");
                    last_failure = "request timed out".to_string();
                }
                Err(e) if e.is_retryable() => {
                    warn!(attempt, error = %e, "Transport error");
                    last_failure = e.to_string();
                }
                Err(e) => return Err(e.into()),
            }

            timeout = (timeout * 2).min(self.timeout_max);
        }

        Err(DriveError::RetriesExhausted {
            attempts: self.retry_limit,
            last: last_failure,
        })
    }

    /// Expected high-volume transient failures (timeouts, ordinary rate
    /// limiting) stay at debug level unless verbose diagnostics are on.
    fn log_transient(&self, attempt: u32, status: u16, message: &str) {
        if self.verbose {
            warn!(attempt, status, message, "Transient remote failure");
        } else {
            debug!(attempt, status, message, "Transient remote failure");
        }
    }
}

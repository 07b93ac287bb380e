//! Credential and token value types.
//!
//! Token material is never logged; `Debug` implementations redact it.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// A bearer access token ready to be attached to a request.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for AccessToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessToken").field(&"[REDACTED]").finish()
    }
}

/// OAuth refresh-token credentials for one identity.
///
/// Both the primary account and every service identity mint short-lived
/// bearer tokens through the same refresh-token exchange.
#[derive(Clone, Deserialize)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    /// Identity label used for eviction bookkeeping and logs. For catalog
    /// entries this is the credential file stem.
    #[serde(default)]
    pub label: String,
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("label", &self.label)
            .finish()
    }
}

/// A minted token with its absolute expiry.
#[derive(Clone)]
pub struct CachedToken {
    pub token: AccessToken,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Builds a cache entry from a token-endpoint `expires_in` (seconds).
    pub fn from_expires_in(token: AccessToken, expires_in: i64) -> Self {
        Self {
            token,
            expires_at: Utc::now() + ChronoDuration::seconds(expires_in),
        }
    }

    /// Whether the token is still usable, treating it as expired `margin`
    /// before the reported expiry. The primary account passes a zero margin
    /// because the endpoint reports the exact lifetime.
    pub fn is_valid(&self, margin: Duration) -> bool {
        let margin = ChronoDuration::from_std(margin).unwrap_or_else(|_| ChronoDuration::zero());
        Utc::now() < self.expires_at - margin
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

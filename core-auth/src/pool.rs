//! The rotating credential pool.
//!
//! One pool instance is shared (by `Arc`) with every remote-call site.
//! Eviction and reload are pool methods; nothing outside the pool mutates
//! the live identity set.

use crate::catalog::IdentityCatalog;
use crate::error::{AuthError, Result};
use crate::exchange::TokenExchanger;
use crate::types::{AccessToken, CachedToken, OAuthCredentials};
use bridge_http::HttpClient;
use core_runtime::config::MirrorConfig;
use core_runtime::events::{AuthEvent, EventBus, MirrorEvent};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct IdentitySlot {
    creds: OAuthCredentials,
    cached: Option<CachedToken>,
}

impl IdentitySlot {
    fn new(creds: OAuthCredentials) -> Self {
        Self { creds, cached: None }
    }
}

/// Rotating set of service identities plus the primary account token cache.
///
/// `acquire(false)` serves the primary-account token, refreshed on expiry
/// with no safety margin (the endpoint reports the exact lifetime).
/// `acquire(true)` draws a uniformly random live service identity,
/// refreshing its token when it is within five minutes of expiry; identities
/// whose refresh fails are evicted immediately and another is drawn. The
/// live set refills batch-by-batch from the identity catalog.
pub struct CredentialPool {
    exchanger: TokenExchanger,
    primary: Option<Mutex<IdentitySlot>>,
    service: Mutex<Vec<IdentitySlot>>,
    catalog: Arc<dyn IdentityCatalog>,
    batch_size: usize,
    expiry_margin: Duration,
    events: EventBus,
}

impl CredentialPool {
    pub fn new(
        http: Arc<dyn HttpClient>,
        primary: Option<OAuthCredentials>,
        catalog: Arc<dyn IdentityCatalog>,
        config: &MirrorConfig,
        events: EventBus,
    ) -> Self {
        Self {
            exchanger: TokenExchanger::new(http),
            primary: primary.map(|creds| Mutex::new(IdentitySlot::new(creds))),
            service: Mutex::new(Vec::new()),
            catalog,
            batch_size: config.identity_batch_size,
            expiry_margin: config.token_expiry_margin,
            events,
        }
    }

    /// Returns a usable bearer token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::PrimaryUnavailable`] when `use_service_identity` is
    ///   false and no primary credentials were configured
    /// - [`AuthError::RefreshFailed`] when the primary refresh fails
    /// - [`AuthError::CredentialsExhausted`] when every catalog identity has
    ///   been evicted
    pub async fn acquire(&self, use_service_identity: bool) -> Result<AccessToken> {
        if use_service_identity {
            self.acquire_service().await
        } else {
            self.acquire_primary().await
        }
    }

    async fn acquire_primary(&self) -> Result<AccessToken> {
        let slot = self.primary.as_ref().ok_or(AuthError::PrimaryUnavailable)?;
        let mut slot = slot.lock().await;

        if let Some(cached) = &slot.cached {
            if cached.is_valid(Duration::ZERO) {
                return Ok(cached.token.clone());
            }
        }

        debug!("Primary token expired, refreshing");
        let cached = self.exchanger.refresh(&slot.creds).await?;
        let token = cached.token.clone();
        slot.cached = Some(cached);
        Ok(token)
    }

    async fn acquire_service(&self) -> Result<AccessToken> {
        loop {
            let picked = {
                let pool = self.service.lock().await;
                if pool.is_empty() {
                    None
                } else {
                    let index = rand::thread_rng().gen_range(0..pool.len());
                    let slot = &pool[index];
                    match &slot.cached {
                        Some(cached) if cached.is_valid(self.expiry_margin) => {
                            return Ok(cached.token.clone());
                        }
                        _ => Some(slot.creds.clone()),
                    }
                }
            };

            let creds = match picked {
                Some(creds) => creds,
                None => {
                    if self.load_next_batch().await? == 0 {
                        return Err(AuthError::CredentialsExhausted);
                    }
                    continue;
                }
            };

            // Refresh outside the pool lock so other call sites keep drawing
            // identities while this exchange is in flight.
            match self.exchanger.refresh(&creds).await {
                Ok(cached) => {
                    let token = cached.token.clone();
                    let mut pool = self.service.lock().await;
                    if let Some(slot) = pool.iter_mut().find(|s| s.creds.label == creds.label) {
                        slot.cached = Some(cached);
                    }
                    return Ok(token);
                }
                Err(e) => {
                    warn!(identity = %creds.label, error = %e, "Service identity failed to mint a token, evicting");
                    self.evict(&creds.label).await;
                }
            }
        }
    }

    /// Removes an identity from the live set for the rest of the process
    /// lifetime. Refilling only ever pulls from the catalog's unseen tail.
    pub async fn evict(&self, label: &str) {
        let mut pool = self.service.lock().await;
        let before = pool.len();
        pool.retain(|slot| slot.creds.label != label);
        if pool.len() < before {
            self.events.emit(MirrorEvent::Auth(AuthEvent::IdentityEvicted {
                identity: label.to_string(),
            }));
        }
    }

    async fn load_next_batch(&self) -> Result<usize> {
        let batch = self.catalog.next_batch(self.batch_size).await?;
        let loaded = batch.len();
        if loaded > 0 {
            let mut pool = self.service.lock().await;
            pool.extend(batch.into_iter().map(IdentitySlot::new));
            let live = pool.len();
            drop(pool);
            info!(loaded, live, "Loaded service identity batch");
            self.events
                .emit(MirrorEvent::Auth(AuthEvent::PoolReloaded { live_identities: live }));
        }
        Ok(loaded)
    }

    /// Discards the live pool and reloads from the first catalog batch.
    ///
    /// Long-running servers call this on a timer so no single batch serves
    /// (and burns quota) forever.
    pub async fn reload(&self) -> Result<usize> {
        self.catalog.reset();
        self.service.lock().await.clear();
        self.load_next_batch().await
    }

    /// Spawns the server-mode reload timer. Abort the returned handle to
    /// stop it.
    pub fn spawn_reload_timer(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so the initial pool
            // state stands until one full interval has passed.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = pool.reload().await {
                    warn!(error = %e, "Scheduled credential pool reload failed");
                }
            }
        })
    }

    pub async fn live_identities(&self) -> usize {
        self.service.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use async_trait::async_trait;
    use bridge_http::{HttpRequest, HttpResponse, Result as HttpResult};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Serves a scripted sequence of token-endpoint responses and counts
    /// calls.
    struct ScriptedHttp {
        script: StdMutex<Vec<(u16, String)>>,
        calls: AtomicUsize,
    }

    impl ScriptedHttp {
        fn new(script: Vec<(u16, String)>) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(script),
                calls: AtomicUsize::new(0),
            })
        }

        fn ok(expires_in: i64) -> (u16, String) {
            (
                200,
                format!(r#"{{"access_token":"tok-{}","expires_in":{}}}"#, expires_in, expires_in),
            )
        }

        fn denied() -> (u16, String) {
            (400, r#"{"error":"invalid_grant"}"#.to_string())
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedHttp {
        async fn execute(&self, _request: HttpRequest) -> HttpResult<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let (status, body) = if script.is_empty() {
                (500, "{}".to_string())
            } else {
                script.remove(0)
            };
            Ok(HttpResponse {
                status,
                body: Bytes::from(body),
            })
        }
    }

    fn service_creds(label: &str) -> OAuthCredentials {
        OAuthCredentials {
            client_id: format!("client-{}", label),
            client_secret: "secret".to_string(),
            refresh_token: "refresh".to_string(),
            label: label.to_string(),
        }
    }

    fn pool_with(
        http: Arc<ScriptedHttp>,
        primary: Option<OAuthCredentials>,
        identities: Vec<OAuthCredentials>,
        batch_size: usize,
    ) -> CredentialPool {
        let config = MirrorConfig::builder()
            .identity_batch_size(batch_size)
            .build()
            .unwrap();
        CredentialPool::new(
            http,
            primary,
            Arc::new(StaticCatalog::new(identities)),
            &config,
            EventBus::new(16),
        )
    }

    #[tokio::test]
    async fn primary_token_is_cached_for_its_lifetime() {
        let http = ScriptedHttp::new(vec![ScriptedHttp::ok(3600)]);
        let pool = pool_with(http.clone(), Some(service_creds("primary")), vec![], 10);

        let first = pool.acquire(false).await.unwrap();
        let second = pool.acquire(false).await.unwrap();
        assert_eq!(first.as_str(), second.as_str());
        assert_eq!(http.call_count(), 1);
    }

    #[tokio::test]
    async fn primary_has_no_early_expiry_margin() {
        // 200 s remaining is inside the 5-minute service margin but the
        // primary token must still be served from cache.
        let http = ScriptedHttp::new(vec![ScriptedHttp::ok(200)]);
        let pool = pool_with(http.clone(), Some(service_creds("primary")), vec![], 10);

        pool.acquire(false).await.unwrap();
        pool.acquire(false).await.unwrap();
        assert_eq!(http.call_count(), 1);
    }

    #[tokio::test]
    async fn service_token_refreshes_inside_margin() {
        // Token valid for 200 s: below the 5-minute margin, so every acquire
        // mints anew.
        let http = ScriptedHttp::new(vec![ScriptedHttp::ok(200), ScriptedHttp::ok(200)]);
        let pool = pool_with(http.clone(), None, vec![service_creds("a")], 10);

        pool.acquire(true).await.unwrap();
        pool.acquire(true).await.unwrap();
        assert_eq!(http.call_count(), 2);
    }

    #[tokio::test]
    async fn service_token_with_long_lifetime_is_cached() {
        let http = ScriptedHttp::new(vec![ScriptedHttp::ok(3600)]);
        let pool = pool_with(http.clone(), None, vec![service_creds("a")], 10);

        pool.acquire(true).await.unwrap();
        pool.acquire(true).await.unwrap();
        assert_eq!(http.call_count(), 1);
    }

    #[tokio::test]
    async fn failing_identity_is_evicted_and_another_drawn() {
        let http = ScriptedHttp::new(vec![ScriptedHttp::denied(), ScriptedHttp::ok(3600)]);
        let pool = pool_with(
            http.clone(),
            None,
            vec![service_creds("a"), service_creds("b")],
            10,
        );

        let token = pool.acquire(true).await.unwrap();
        assert!(token.as_str().starts_with("tok-"));
        assert_eq!(http.call_count(), 2);
        assert_eq!(pool.live_identities().await, 1);
    }

    #[tokio::test]
    async fn empty_pool_refills_from_catalog_tail() {
        // Batch size 1: identity "a" fails and is evicted, the pool refills
        // with "b" from the unseen tail, which succeeds.
        let http = ScriptedHttp::new(vec![ScriptedHttp::denied(), ScriptedHttp::ok(3600)]);
        let pool = pool_with(
            http.clone(),
            None,
            vec![service_creds("a"), service_creds("b")],
            1,
        );

        pool.acquire(true).await.unwrap();
        assert_eq!(pool.live_identities().await, 1);
    }

    #[tokio::test]
    async fn exhausted_catalog_is_fatal() {
        let http = ScriptedHttp::new(vec![ScriptedHttp::denied()]);
        let pool = pool_with(http, None, vec![service_creds("a")], 10);

        let err = pool.acquire(true).await.unwrap_err();
        assert!(matches!(err, AuthError::CredentialsExhausted));
    }

    #[tokio::test]
    async fn acquire_without_primary_credentials_fails() {
        let http = ScriptedHttp::new(vec![]);
        let pool = pool_with(http, None, vec![service_creds("a")], 10);

        let err = pool.acquire(false).await.unwrap_err();
        assert!(matches!(err, AuthError::PrimaryUnavailable));
    }

    #[tokio::test]
    async fn reload_restarts_from_first_batch() {
        let http = ScriptedHttp::new(vec![ScriptedHttp::ok(3600), ScriptedHttp::ok(3600)]);
        let pool = pool_with(
            http,
            None,
            vec![service_creds("a"), service_creds("b")],
            1,
        );

        pool.acquire(true).await.unwrap();
        assert_eq!(pool.live_identities().await, 1);

        // Reload discards the pool and rewinds the catalog to batch one.
        let loaded = pool.reload().await.unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(pool.live_identities().await, 1);
    }
}

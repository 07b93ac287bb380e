//! OAuth refresh-token exchange against the provider token endpoint.

use crate::error::{AuthError, Result};
use crate::types::{AccessToken, CachedToken, OAuthCredentials};
use bridge_http::{HttpClient, HttpRequest};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Google OAuth 2.0 token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Token endpoint response body.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Exchanges refresh tokens for short-lived access tokens.
pub struct TokenExchanger {
    http: Arc<dyn HttpClient>,
    token_url: String,
}

impl TokenExchanger {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self::with_token_url(http, DEFAULT_TOKEN_URL)
    }

    /// Overrides the token endpoint (tests, alternative deployments).
    pub fn with_token_url(http: Arc<dyn HttpClient>, token_url: impl Into<String>) -> Self {
        Self {
            http,
            token_url: token_url.into(),
        }
    }

    /// Performs one refresh exchange, single attempt: the pool handles
    /// failure by evicting the identity and drawing another.
    pub async fn refresh(&self, credentials: &OAuthCredentials) -> Result<CachedToken> {
        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", credentials.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let request = HttpRequest::post(&self.token_url)
            .form(&params)
            .map_err(|e| AuthError::RefreshFailed {
                identity: credentials.label.clone(),
                reason: e.to_string(),
            })?;

        let response = self.http.execute(request).await?;
        if !response.is_success() {
            return Err(AuthError::RefreshFailed {
                identity: credentials.label.clone(),
                reason: format!("token endpoint returned {}: {}", response.status, response.text()),
            });
        }

        let body: TokenResponse = response.json().map_err(|e| AuthError::RefreshFailed {
            identity: credentials.label.clone(),
            reason: format!("unparseable token response: {}", e),
        })?;

        debug!(
            identity = %credentials.label,
            expires_in = body.expires_in,
            "Minted access token"
        );

        Ok(CachedToken::from_expires_in(
            AccessToken::new(body.access_token),
            body.expires_in,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_http::{HttpResponse, Result as HttpResult};
    use bytes::Bytes;
    use std::sync::Mutex;

    struct CannedHttp {
        responses: Mutex<Vec<(u16, &'static str)>>,
        seen_bodies: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpClient for CannedHttp {
        async fn execute(&self, request: HttpRequest) -> HttpResult<HttpResponse> {
            if let Some(body) = &request.body {
                self.seen_bodies
                    .lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(body).into_owned());
            }
            let (status, body) = self.responses.lock().unwrap().remove(0);
            Ok(HttpResponse {
                status,
                body: Bytes::from_static(body.as_bytes()),
            })
        }
    }

    fn creds() -> OAuthCredentials {
        OAuthCredentials {
            client_id: "cid".to_string(),
            client_secret: "sec".to_string(),
            refresh_token: "rt".to_string(),
            label: "primary".to_string(),
        }
    }

    #[tokio::test]
    async fn refresh_parses_token_response() {
        let http = Arc::new(CannedHttp {
            responses: Mutex::new(vec![(200, r#"{"access_token":"tok","expires_in":3599}"#)]),
            seen_bodies: Mutex::new(Vec::new()),
        });
        let exchanger = TokenExchanger::new(http.clone());

        let cached = exchanger.refresh(&creds()).await.unwrap();
        assert_eq!(cached.token.as_str(), "tok");
        assert!(cached.is_valid(std::time::Duration::ZERO));

        let bodies = http.seen_bodies.lock().unwrap();
        assert!(bodies[0].contains("grant_type=refresh_token"));
        assert!(bodies[0].contains("refresh_token=rt"));
    }

    #[tokio::test]
    async fn refresh_failure_names_the_identity() {
        let http = Arc::new(CannedHttp {
            responses: Mutex::new(vec![(400, r#"{"error":"invalid_grant"}"#)]),
            seen_bodies: Mutex::new(Vec::new()),
        });
        let exchanger = TokenExchanger::new(http);

        let err = exchanger.refresh(&creds()).await.unwrap_err();
        match err {
            AuthError::RefreshFailed { identity, reason } => {
                assert_eq!(identity, "primary");
                assert!(reason.contains("400"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

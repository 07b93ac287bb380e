//! HTTP request/response value types and the client trait.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{HttpError, Result};

/// HTTP method types used by the Drive API surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

/// One outgoing HTTP request.
///
/// Query parameters are kept separate from the URL until send time so callers
/// can assemble them incrementally; values are percent-encoded when the final
/// URL is built.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.as_ref()))
    }

    /// Attach a JSON body and the matching content type.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let json = serde_json::to_vec(body)
            .map_err(|e| HttpError::InvalidRequest(format!("JSON serialization failed: {}", e)))?;
        self.body = Some(Bytes::from(json));
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    /// Attach a `application/x-www-form-urlencoded` body (token endpoints).
    pub fn form<T: Serialize>(mut self, params: &T) -> Result<Self> {
        let encoded = serde_urlencoded::to_string(params)
            .map_err(|e| HttpError::InvalidRequest(format!("Form encoding failed: {}", e)))?;
        self.body = Some(Bytes::from(encoded));
        self.headers.insert(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        Ok(self)
    }

    /// Attach a raw, already-encoded body.
    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Final URL with the accumulated query string appended.
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let qs = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.url, sep, qs)
    }
}

/// HTTP response: status plus raw body bytes.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    /// Parse the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| HttpError::Decode(format!("JSON deserialization failed: {}", e)))
    }

    /// Response body as a UTF-8 string (lossy; error bodies are diagnostics).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Async HTTP transport.
///
/// Implementations perform exactly one request per call; retry, token
/// injection, and failure classification are owned by the callers (the
/// request executor and the credential pool) so those policies stay testable
/// against a mocked transport.
///
/// A non-2xx status is a successful `execute`: classification of HTTP-level
/// errors belongs to the caller. `Err` is reserved for transport failures
/// (connect, TLS, timeout) and malformed requests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_assembles_headers_and_query() {
        let request = HttpRequest::get("https://example.com/files")
            .query("pageSize", "1000")
            .query("q", "'root' in parents")
            .bearer_token("secret")
            .timeout(Duration::from_secs(7));

        assert!(request.headers.contains_key("Authorization"));
        assert_eq!(request.timeout, Some(Duration::from_secs(7)));
        let url = request.full_url();
        assert!(url.starts_with("https://example.com/files?pageSize=1000&"));
        assert!(url.contains("%27root%27%20in%20parents"));
    }

    #[test]
    fn full_url_appends_to_existing_query_string() {
        let request = HttpRequest::get("https://example.com/files?alt=json").query("x", "1");
        assert_eq!(request.full_url(), "https://example.com/files?alt=json&x=1");
    }

    #[test]
    fn form_body_sets_content_type() {
        let params = [("grant_type", "refresh_token"), ("refresh_token", "abc")];
        let request = HttpRequest::post("https://oauth.example").form(&params).unwrap();
        assert_eq!(
            request.headers.get("Content-Type").map(String::as_str),
            Some("application/x-www-form-urlencoded")
        );
        let body = request.body.unwrap();
        assert!(std::str::from_utf8(&body).unwrap().contains("grant_type=refresh_token"));
    }

    #[test]
    fn response_status_checks() {
        let response = HttpResponse {
            status: 404,
            body: Bytes::from_static(b"{\"error\":{}}"),
        };
        assert!(!response.is_success());
        assert_eq!(response.text(), "{\"error\":{}}");
    }
}

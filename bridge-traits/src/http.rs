//! HTTP Client Abstraction
//!
//! The request/response transport every catalog and session call goes through.
//! Implementations own connection pooling, TLS and timeouts; the core only
//! ever sees [`HttpRequest`] in and [`HttpResponse`] (or [`BridgeError`]) out.

use async_trait::async_trait;
use bytes::Bytes;
use core_async::sync::CancellationToken;
use futures::future::{self, Either};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// HTTP request builder
#[derive(Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
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

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.as_ref()))
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let json = serde_json::to_vec(body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON serialization failed: {}", e))
        })?;
        self.body = Some(Bytes::from(json));
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Apply `duration` only when the caller has not set a timeout already.
    pub fn default_timeout(mut self, duration: Option<Duration>) -> Self {
        if self.timeout.is_none() {
            self.timeout = duration;
        }
        self
    }
}

// Authorization headers must never reach logs.
impl std::fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let headers: Vec<&str> = self.headers.keys().map(String::as_str).collect();
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &headers)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Parse response body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON deserialization failed: {}", e))
        })
    }

    /// Get response body as UTF-8 string
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid UTF-8: {}", e)))
    }

    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 401 or 403: the bearer token was rejected.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status, 401 | 403)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Async HTTP client trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest};
///
/// async fn fetch_me(client: &dyn HttpClient, token: &str) -> Result<String> {
///     let request = HttpRequest::get("http://localhost:3000/api/catalog/me")
///         .bearer_token(token);
///     client.execute(request).await?.text()
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request.
    ///
    /// Non-2xx statuses are returned as a normal [`HttpResponse`]; only
    /// connection, TLS and timeout failures are errors.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Execute a request that is abandoned as soon as `cancel` fires.
    ///
    /// Returns [`BridgeError::Cancelled`] if the token is cancelled before or
    /// during the request, even when a response raced in.
    async fn execute_cancellable(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        if cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }

        let cancelled = Box::pin(cancel.cancelled());
        match future::select(cancelled, self.execute(request)).await {
            Either::Left(_) => Err(BridgeError::Cancelled),
            Either::Right((result, _)) => {
                if cancel.is_cancelled() {
                    Err(BridgeError::Cancelled)
                } else {
                    result
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct SlowClient {
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl HttpClient for SlowClient {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(HttpResponse::new(200, "{}"))
        }
    }

    #[test]
    fn test_http_request_builder() {
        let request = HttpRequest::get("https://example.com")
            .header("User-Agent", "test")
            .bearer_token("secret")
            .timeout(Duration::from_secs(30));

        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "https://example.com");
        assert_eq!(request.headers.get("User-Agent"), Some(&"test".to_string()));
        assert_eq!(
            request.headers.get("Authorization"),
            Some(&"Bearer secret".to_string())
        );
    }

    #[test]
    fn test_request_debug_hides_header_values() {
        let request = HttpRequest::get("https://example.com").bearer_token("top-secret");
        let debug = format!("{:?}", request);

        assert!(debug.contains("Authorization"));
        assert!(!debug.contains("top-secret"));
    }

    #[test]
    fn test_default_timeout_keeps_explicit_value() {
        let explicit = HttpRequest::get("https://example.com")
            .timeout(Duration::from_secs(1))
            .default_timeout(Some(Duration::from_secs(30)));
        assert_eq!(explicit.timeout, Some(Duration::from_secs(1)));

        let defaulted =
            HttpRequest::get("https://example.com").default_timeout(Some(Duration::from_secs(30)));
        assert_eq!(defaulted.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let request = HttpRequest::post("https://example.com")
            .json(&serde_json::json!({ "refresh_token": "r" }))
            .unwrap();

        assert_eq!(
            request.headers.get("Content-Type"),
            Some(&"application/json".to_string())
        );
        assert_eq!(
            request.body.as_deref(),
            Some(br#"{"refresh_token":"r"}"#.as_slice())
        );
    }

    #[test]
    fn test_http_response_status_checks() {
        assert!(HttpResponse::new(204, "").is_success());
        assert!(HttpResponse::new(401, "").is_auth_failure());
        assert!(HttpResponse::new(403, "").is_auth_failure());
        assert!(!HttpResponse::new(404, "").is_auth_failure());
        assert!(HttpResponse::new(502, "").is_server_error());
    }

    #[tokio::test]
    async fn test_execute_cancellable_short_circuits_when_already_cancelled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = SlowClient {
            calls: calls.clone(),
            delay: Duration::from_millis(1),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = client
            .execute_cancellable(HttpRequest::get("https://example.com"), &cancel)
            .await;

        assert!(matches!(result, Err(BridgeError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_execute_cancellable_abandons_in_flight_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = SlowClient {
            calls: calls.clone(),
            delay: Duration::from_secs(60),
        };
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = client
            .execute_cancellable(HttpRequest::get("https://example.com"), &cancel)
            .await;

        assert!(matches!(result, Err(BridgeError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_cancellable_passes_response_through() {
        let client = SlowClient {
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Duration::from_millis(1),
        };
        let cancel = CancellationToken::new();

        let response = client
            .execute_cancellable(HttpRequest::get("https://example.com"), &cancel)
            .await
            .unwrap();

        assert_eq!(response.status, 200);
    }
}

//! Shared REST client: one `reqwest::Client`, correlation IDs, and a
//! single-flight refresh-and-retry policy for 401 responses.
//!
//! Every request carries a fresh UUIDv7 in `X-Request-Id`. When a response
//! is 401, the request waits for one token refresh and is retried exactly
//! once with the new token. Concurrent requests that were rejected with the
//! same token share a single refresh: the first one performs it while the
//! others queue on the auth slot, then either all retry with the new token
//! or all fail if that refresh failed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use gigboard_core::{correlation_id, defaults, Error, Result, TokenProvider};

/// Token state guarded by the refresh lock.
///
/// `epoch` increases every time the token changes, so a request that saw a
/// 401 can tell whether someone else already refreshed past its token.
/// `attempts` counts refresh attempts, successful or not: a request whose
/// token read predates a failed attempt shares that attempt's failure, while
/// later requests start their own refresh.
#[derive(Debug, Default)]
struct AuthSlot {
    token: Option<String>,
    epoch: u64,
    attempts: u64,
    seeded: bool,
}

/// Token state observed by one request before it was sent.
#[derive(Debug, Clone)]
struct TokenView {
    token: Option<String>,
    epoch: u64,
    attempts: u64,
}

/// Method, path and payload of one logical request, rebuilt per attempt.
#[derive(Debug, Clone)]
struct RequestSpec {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<JsonValue>,
}

/// REST client shared by all gigboard services.
pub struct ApiClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    auth: Mutex<AuthSlot>,
}

impl ApiClient {
    /// Create a client for `base_url` (which includes the `/api` prefix).
    pub fn new(
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            auth: Mutex::new(AuthSlot::default()),
        })
    }

    /// Create a client with the default request timeout.
    pub fn with_defaults(base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        Self::new(
            base_url,
            tokens,
            Duration::from_secs(defaults::REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replace the token (e.g. after an interactive sign-in).
    pub async fn set_token(&self, token: Option<String>) {
        let mut slot = self.auth.lock().await;
        slot.token = token;
        slot.seeded = true;
        slot.epoch += 1;
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let spec = RequestSpec::new(Method::GET, path).with_query(query);
        self.send_json(spec).await
    }

    pub async fn post_json<T: DeserializeOwned>(&self, path: &str, body: JsonValue) -> Result<T> {
        let spec = RequestSpec::new(Method::POST, path).with_body(body);
        self.send_json(spec).await
    }

    pub async fn put_json<T: DeserializeOwned>(&self, path: &str, body: JsonValue) -> Result<T> {
        let spec = RequestSpec::new(Method::PUT, path).with_body(body);
        self.send_json(spec).await
    }

    /// PATCH without a meaningful response body.
    pub async fn patch(&self, path: &str) -> Result<()> {
        self.execute(RequestSpec::new(Method::PATCH, path)).await?;
        Ok(())
    }

    /// DELETE without a meaningful response body.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute(RequestSpec::new(Method::DELETE, path)).await?;
        Ok(())
    }

    async fn send_json<T: DeserializeOwned>(&self, spec: RequestSpec) -> Result<T> {
        let resp = self.execute(spec).await?;
        resp.json::<T>()
            .await
            .map_err(|e| Error::Serialization(format!("response body: {}", e)))
    }

    /// Run one logical request, with at most one refresh-and-retry.
    async fn execute(&self, spec: RequestSpec) -> Result<Response> {
        let request_id = correlation_id();
        let seen = self.current_token().await?;

        let resp = self
            .dispatch(&spec, seen.token.as_deref(), &request_id)
            .await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Self::check(resp).await;
        }

        debug!(
            request_id = %request_id,
            path = %spec.path,
            "Unauthorized response, refreshing token"
        );
        let token = self.refresh_after(&seen).await?;
        let resp = self.dispatch(&spec, Some(&token), &request_id).await?;
        Self::check(resp).await
    }

    async fn current_token(&self) -> Result<TokenView> {
        let mut slot = self.auth.lock().await;
        if !slot.seeded {
            slot.token = self.tokens.access_token().await?;
            slot.seeded = true;
        }
        Ok(TokenView {
            token: slot.token.clone(),
            epoch: slot.epoch,
            attempts: slot.attempts,
        })
    }

    /// Single-flight refresh for a request rejected with the token in `seen`.
    async fn refresh_after(&self, seen: &TokenView) -> Result<String> {
        let mut slot = self.auth.lock().await;

        if slot.epoch != seen.epoch {
            // Someone refreshed while we waited for the lock.
            return slot
                .token
                .clone()
                .ok_or_else(|| Error::Unauthorized("signed out".to_string()));
        }
        if slot.attempts != seen.attempts {
            // A refresh started after our token was read and failed.
            return Err(Error::Unauthorized("token refresh failed".to_string()));
        }

        slot.attempts += 1;
        match self.tokens.refresh().await {
            Ok(token) => {
                slot.token = Some(token.clone());
                slot.epoch += 1;
                debug!(
                    subsystem = "http",
                    component = "token_refresh",
                    epoch = slot.epoch,
                    "Access token refreshed"
                );
                Ok(token)
            }
            Err(e) => {
                warn!(
                    subsystem = "http",
                    component = "token_refresh",
                    error = %e,
                    "Token refresh failed"
                );
                Err(Error::Unauthorized(format!("token refresh failed: {}", e)))
            }
        }
    }

    async fn dispatch(
        &self,
        spec: &RequestSpec,
        token: Option<&str>,
        request_id: &str,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url, spec.path);
        let mut req = self
            .http
            .request(spec.method.clone(), &url)
            .header(defaults::REQUEST_ID_HEADER, request_id);
        if !spec.query.is_empty() {
            req = req.query(&spec.query);
        }
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(ref body) = spec.body {
            req = req.json(body);
        }

        let start = Instant::now();
        let result = req.send().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(resp) => {
                debug!(
                    subsystem = "http",
                    component = "api_client",
                    request_id = %request_id,
                    method = %spec.method,
                    path = %spec.path,
                    status = resp.status().as_u16(),
                    duration_ms,
                    "HTTP request completed"
                );
                Ok(resp)
            }
            Err(e) => {
                warn!(
                    subsystem = "http",
                    component = "api_client",
                    request_id = %request_id,
                    method = %spec.method,
                    path = %spec.path,
                    duration_ms,
                    error = %e,
                    "HTTP request failed"
                );
                Err(e.into())
            }
        }
    }

    /// Map non-success statuses to `Error`, preferring the server's message.
    async fn check(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Error::from_status(status.as_u16(), server_message(&body, status)))
    }
}

impl RequestSpec {
    fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: Vec::new(),
            body: None,
        }
    }

    fn with_query(mut self, query: &[(&str, String)]) -> Self {
        self.query = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self
    }

    fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }
}

/// Extract `message` or `error` from a JSON error body, else the raw text.
fn server_message(body: &str, status: StatusCode) -> String {
    if let Ok(json) = serde_json::from_str::<JsonValue>(body) {
        for key in ["message", "error"] {
            if let Some(msg) = json.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

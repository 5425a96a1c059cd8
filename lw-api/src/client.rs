//! HTTP client for the event-subscription REST API.
//!
//! Handles the client-id and bearer-token headers, timeout management,
//! exponential backoff retry, and request/response lifecycle.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use lw_core::config::AppConfig;
use lw_core::error::{LwError, LwResult};

use crate::response::{ErrorBody, HelixResponse};

/// Retry configuration for HTTP requests.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// HTTP status codes that trigger a retry.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            retryable_statuses: vec![500, 502, 503, 504],
        }
    }
}

/// HTTP client for the subscription endpoints.
///
/// Wraps reqwest::Client with header injection, retry logic, and error
/// handling. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    inner: Client,
    /// Base URL for the API (e.g. "https://api.twitch.tv/helix").
    base_url: String,
    /// Application client id sent as `Client-Id`.
    client_id: String,
    /// User access token sent as a bearer token. Replaceable at runtime.
    access_token: Arc<RwLock<String>>,
    /// Default request timeout.
    timeout: Duration,
    retry_config: RetryConfig,
}

impl ApiClient {
    /// Create a new ApiClient from the application configuration.
    pub fn new(config: &AppConfig) -> LwResult<Self> {
        if config.twitch.client_id.trim().is_empty() {
            return Err(LwError::MissingConfig("twitch.client_id".into()));
        }

        let timeout = Duration::from_millis(config.api.timeout_ms);
        let inner = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| LwError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            client_id: config.twitch.client_id.trim().to_string(),
            access_token: Arc::new(RwLock::new(config.twitch.access_token.trim().to_string())),
            timeout,
            retry_config: RetryConfig::default(),
        })
    }

    /// Set custom retry configuration.
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Get the API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the application client id.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Replace the access token (for example after a token refresh).
    pub async fn set_access_token(&self, token: impl Into<String>) {
        let mut guard = self.access_token.write().await;
        *guard = token.into();
        debug!("access token updated");
    }

    /// Build the full URL for an API path.
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Apply the client-id and authorization headers to a request builder.
    async fn apply_headers(&self, builder: RequestBuilder) -> RequestBuilder {
        let token = self.access_token.read().await;
        let builder = builder.header("Client-Id", self.client_id.as_str());
        if token.is_empty() {
            builder
        } else {
            builder.bearer_auth(token.as_str())
        }
    }

    /// Internal: build a request for the given method, URL, query pairs, and optional JSON body.
    ///
    /// Query pairs are form-encoded by `reqwest`.
    async fn build_request(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> RequestBuilder {
        let mut builder = self.inner.request(method, url).timeout(self.timeout);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(b) = body {
            builder = builder.json(b);
        }
        self.apply_headers(builder).await
    }

    /// Execute a request with exponential backoff retry.
    async fn request_with_retry(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> LwResult<Response> {
        let url = self.url(path);
        debug!("{} {}", method, path);

        let mut last_error: Option<LwError> = None;

        for attempt in 0..=self.retry_config.max_retries {
            if attempt > 0 {
                let delay = self.calculate_retry_delay(attempt - 1);
                warn!(
                    "retrying {} {} (attempt {}/{}) after {:.1}s",
                    method,
                    path,
                    attempt + 1,
                    self.retry_config.max_retries + 1,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }

            let builder = self.build_request(method.clone(), &url, query, body).await;

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();

                    if self
                        .retry_config
                        .retryable_statuses
                        .contains(&status.as_u16())
                        && attempt < self.retry_config.max_retries
                    {
                        warn!("retryable status {} from {}", status.as_u16(), path);
                        last_error = Some(LwError::ServerError {
                            status: status.as_u16(),
                            message: format!("retryable status {status}"),
                        });
                        continue;
                    }

                    return Self::check_status(response).await;
                }
                Err(e) => {
                    let is_retryable = e.is_timeout() || e.is_connect();
                    let err = Self::classify_error(e);

                    if is_retryable && attempt < self.retry_config.max_retries {
                        warn!("retryable error on {}: {}", path, err);
                        last_error = Some(err);
                        continue;
                    }

                    return Err(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LwError::Http("max retries exceeded".into())))
    }

    /// Calculate retry delay with exponential backoff.
    fn calculate_retry_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.retry_config.base_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << attempt.min(32));
        let max_ms = self.retry_config.max_delay.as_millis() as u64;
        Duration::from_millis(delay_ms.min(max_ms))
    }

    // --- Public HTTP methods ---

    /// Execute a GET request with automatic retry.
    pub async fn get(&self, path: &str) -> LwResult<Response> {
        self.request_with_retry(Method::GET, path, &[], None).await
    }

    /// Execute a GET request with encoded query pairs.
    pub async fn get_with_query(&self, path: &str, query: &[(&str, &str)]) -> LwResult<Response> {
        self.request_with_retry(Method::GET, path, query, None).await
    }

    /// Execute a POST request with a JSON body.
    pub async fn post(&self, path: &str, body: &serde_json::Value) -> LwResult<Response> {
        self.request_with_retry(Method::POST, path, &[], Some(body)).await
    }

    /// Execute a DELETE request.
    pub async fn delete(&self, path: &str) -> LwResult<Response> {
        self.request_with_retry(Method::DELETE, path, &[], None).await
    }

    /// Execute a DELETE request with encoded query pairs.
    pub async fn delete_with_query(&self, path: &str, query: &[(&str, &str)]) -> LwResult<Response> {
        self.request_with_retry(Method::DELETE, path, query, None).await
    }

    // --- Response helpers ---

    /// Deserialize a response body into a HelixResponse<T>.
    pub async fn parse_response<T: DeserializeOwned>(
        response: Response,
    ) -> LwResult<HelixResponse<T>> {
        response
            .json::<HelixResponse<T>>()
            .await
            .map_err(|e| LwError::Serialization(format!("failed to parse response: {e}")))
    }

    /// Convenience: GET + parse into HelixResponse<T>.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> LwResult<HelixResponse<T>> {
        let resp = self.get(path).await?;
        Self::parse_response(resp).await
    }

    /// Convenience: GET with query pairs + parse into HelixResponse<T>.
    pub async fn get_json_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> LwResult<HelixResponse<T>> {
        let resp = self.get_with_query(path, query).await?;
        Self::parse_response(resp).await
    }

    /// Convenience: POST + parse into HelixResponse<T>.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> LwResult<HelixResponse<T>> {
        let resp = self.post(path, body).await?;
        Self::parse_response(resp).await
    }

    /// Check the HTTP status code and convert to LwError if needed.
    async fn check_status(response: Response) -> LwResult<Response> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(LwError::AuthFailed(format!(
                "server returned {status}: {}",
                error_message(&body)
            )));
        }

        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(LwError::ServerError {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(response)
    }

    /// Classify a reqwest error into a LwError variant.
    fn classify_error(e: reqwest::Error) -> LwError {
        if e.is_timeout() {
            LwError::Timeout(e.to_string())
        } else if e.is_connect() {
            LwError::Http(format!("connection failed: {e}"))
        } else {
            LwError::Http(e.to_string())
        }
    }
}

/// Extract the message from an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string())
}

//! # HTTP Retrieval Utilities
//!
//! This module provides a robust, asynchronous request client wrapper around `reqwest`.
//! Every call goes through the same pipeline:
//!
//! 1. **Cache**: when the caller names a cache key and a live entry exists,
//!    it is returned without touching the network or the rate limiter.
//! 2. **Admission**: the client's sliding-window `RateLimiter` must admit the
//!    request; refusal fails fast with `RateLimited` (local origin).
//! 3. **Exchange**: the request is sent and its body read under one timeout.
//!    Dropping the future on expiry abandons the call; no partial result is
//!    returned.
//! 4. **Classification**: non-2xx statuses become typed `RequestError`s.
//! 5. **Store**: successful bodies are cached when the caller gave a TTL.
//!
//! Retries are layered on top with [`with_retry`], which only retries
//! timeouts and 5xx responses.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::cache::ResponseCache;
use super::errors::{RateLimitOrigin, RequestError};
use super::rate_limiter::{RateLimiter, UsageStats};
use crate::configs::ClientConfig;

const X_CLIENT: HeaderName = HeaderName::from_static("x-client");
const X_CLIENT_VERSION: HeaderName = HeaderName::from_static("x-client-version");

/// A response body: decoded JSON, or the raw text when the server did not
/// send JSON (or sent JSON that failed to parse).
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// A parsed JSON document.
    Json(Value),
    /// Verbatim text.
    Raw(String),
}

impl ResponseBody {
    /// Decodes the body into `T`. Raw bodies are parsed as JSON on demand.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RequestError> {
        match self {
            ResponseBody::Json(value) => T::deserialize(value)
                .map_err(|e| RequestError::ParseError(e.to_string())),
            ResponseBody::Raw(text) => {
                serde_json::from_str(text).map_err(|e| RequestError::ParseError(e.to_string()))
            }
        }
    }

    /// The body as a JSON value; raw text becomes a JSON string.
    pub fn into_value(self) -> Value {
        match self {
            ResponseBody::Json(value) => value,
            ResponseBody::Raw(text) => Value::String(text),
        }
    }
}

/// A successful exchange.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status (200 for cache hits).
    pub status: u16,
    /// Response headers (empty for cache hits).
    pub headers: HeaderMap,
    /// The body.
    pub body: ResponseBody,
    /// True when served from the response cache.
    pub from_cache: bool,
}

/// How a request interacts with the response cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachePolicy {
    /// Cache key looked up before the call.
    pub key: String,
    /// Lifetime of the stored body; `None` reads without storing.
    pub ttl: Option<Duration>,
}

impl CachePolicy {
    /// Read from and store into the cache.
    pub fn new(key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            ttl: Some(ttl),
        }
    }

    /// Read from the cache but never store.
    pub fn read_only(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ttl: None,
        }
    }
}

/// Per-call options, the analogue of a fetch `RequestInit`.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// HTTP verb (GET by default).
    pub method: Method,
    /// JSON body.
    pub body: Option<Value>,
    /// Extra headers; these override the client defaults.
    pub headers: HeaderMap,
    /// Cache interaction.
    pub cache: Option<CachePolicy>,
    /// Overrides the configured timeout.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// A GET without body.
    pub fn get() -> Self {
        Self::default()
    }

    /// A request with the given verb and optional JSON body.
    pub fn with_method(method: Method, body: Option<Value>) -> Self {
        Self {
            method,
            body,
            ..Self::default()
        }
    }

    /// Attaches a cache policy.
    pub fn cached(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.cache = Some(CachePolicy::new(key, ttl));
        self
    }

    /// Overrides the timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Adds one header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Retry schedule for [`with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first included.
    pub attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// `base * 2^retry`, capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl From<&ClientConfig> for RetryPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            attempts: config.retry_attempts,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
        }
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.attempts` attempts have failed with retryable errors, in which
/// case `MaxRetriesExceeded` carries the last failure.
pub async fn with_retry<T, F, Fut>(mut operation: F, policy: RetryPolicy) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let attempts = policy.attempts.max(1);
    let mut failed = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                failed += 1;
                if failed >= attempts {
                    log::error!("Giving up after {} attempts: {}", attempts, e);
                    return Err(RequestError::MaxRetriesExceeded {
                        attempts,
                        last: Box::new(e),
                    });
                }
                let delay = policy.delay_for(failed - 1);
                log::warn!(
                    "Attempt {}/{} failed ({}). Retrying in {}ms...",
                    failed,
                    attempts,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Aggregate result of [`RequestClient::batch`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    /// Bodies of the successful requests, in request order.
    pub values: Vec<Value>,
    /// One message per failed request.
    pub errors: Vec<String>,
    /// Requests issued.
    pub total: usize,
    /// Requests that succeeded.
    pub successful: usize,
    /// Requests that failed.
    pub failed: usize,
}

impl BatchOutcome {
    /// True when every request succeeded.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// A flexible asynchronous HTTP client.
///
/// Handles the base URL, bearer authentication, default headers, the
/// response cache and the sliding-window rate limiter. Both the cache and
/// the limiter belong to this instance; share the client (e.g. in an `Arc`)
/// to share them.
pub struct RequestClient {
    /// The underlying connection-pooling client.
    inner: reqwest::Client,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
    config: ClientConfig,
    cache: Mutex<ResponseCache<ResponseBody>>,
    limiter: Mutex<RateLimiter>,
}

impl RequestClient {
    /// Creates a new client from its configuration.
    ///
    /// # Errors
    /// Returns `InvalidUrl` if the base URL is not absolute, and
    /// `InvalidInput` if the rate limit admits no requests at all.
    pub fn new(config: ClientConfig) -> Result<Self, RequestError> {
        if config.max_requests_per_window == 0 {
            return Err(RequestError::InvalidInput(
                "maxRequestsPerWindow must be at least 1".to_string(),
            ));
        }

        // A trailing slash makes `join` append instead of replacing the last segment.
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url =
            Url::parse(&base).map_err(|e| RequestError::InvalidUrl(format!("{}: {}", base, e)))?;

        let inner = reqwest::Client::builder()
            .user_agent(format!("{}/{}", config.client_name, config.client_version))
            .build()?;

        let limiter = RateLimiter::new(config.max_requests_per_window, config.rate_limit_window);

        Ok(Self {
            inner,
            base_url,
            cache: Mutex::new(ResponseCache::new()),
            limiter: Mutex::new(limiter),
            config,
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Resolves an endpoint: absolute `http(s)://` URLs are used as-is,
    /// anything else is joined onto the base URL.
    pub fn resolve(&self, endpoint: &str) -> Result<Url, RequestError> {
        let parsed = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            Url::parse(endpoint)
        } else {
            self.base_url.join(endpoint.trim_start_matches('/'))
        };
        parsed.map_err(|e| RequestError::InvalidUrl(format!("{}: {}", endpoint, e)))
    }

    /// Performs one request through the cache → admission → exchange pipeline.
    pub async fn request(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse, RequestError> {
        // 1. Cache
        if let Some(policy) = &options.cache {
            if let Some(body) = self.lock_cache().get(&policy.key) {
                log::debug!("Cache hit for '{}'", policy.key);
                return Ok(ApiResponse {
                    status: 200,
                    headers: HeaderMap::new(),
                    body,
                    from_cache: true,
                });
            }
        }

        let url = self.resolve(endpoint)?;
        let timeout = options.timeout.unwrap_or(self.config.timeout);
        let headers = self.build_headers(&options.headers)?;

        // 2. Admission (check and record under one lock)
        {
            let mut limiter = self.lock_limiter();
            if !limiter.can_make_request() {
                log::warn!("Local rate limit reached; refusing {}", endpoint);
                return Err(RequestError::RateLimited {
                    origin: RateLimitOrigin::Local,
                });
            }
            limiter.record_request();
        }

        // 3. Exchange
        log::debug!("{} {}", options.method, url);

        let exchange = async {
            let mut req = self.inner.request(options.method.clone(), url.clone()).headers(headers);
            if let Some(body) = &options.body {
                let json_body =
                    serde_json::to_string(body).map_err(|e| RequestError::InvalidInput(e.to_string()))?;
                req = req.body(json_body);
            }
            let response = req.send().await?;
            let status = response.status();
            let resp_headers = response.headers().clone();
            let is_json = resp_headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|ct| ct.contains("application/json"))
                .unwrap_or(false);
            let text = response.text().await?;
            Ok::<_, RequestError>((status, resp_headers, is_json, text))
        };

        let (status, resp_headers, is_json, text) =
            match tokio::time::timeout(timeout, exchange).await {
                Ok(result) => result.map_err(|e| match e {
                    RequestError::Timeout(_) => RequestError::Timeout(timeout),
                    other => other,
                })?,
                Err(_) => {
                    log::warn!("{} {} timed out after {}ms", options.method, url, timeout.as_millis());
                    return Err(RequestError::Timeout(timeout));
                }
            };

        // 4. Classification
        if !status.is_success() {
            let message = error_message(&text)
                .or_else(|| status.canonical_reason().map(str::to_string));
            let err = RequestError::from_status(status.as_u16(), message);
            log::debug!("{} {} -> {}", options.method, url, err);
            return Err(err);
        }

        let body = if is_json {
            match serde_json::from_str(&text) {
                Ok(value) => ResponseBody::Json(value),
                Err(e) => {
                    log::warn!("Malformed JSON from {} ({}); passing through raw", url, e);
                    ResponseBody::Raw(text)
                }
            }
        } else {
            ResponseBody::Raw(text)
        };

        // 5. Store
        if let Some(CachePolicy { key, ttl: Some(ttl) }) = &options.cache {
            self.lock_cache().set(key.clone(), body.clone(), *ttl);
        }

        log::trace!("{} {} -> {}", options.method, url, status);
        Ok(ApiResponse {
            status: status.as_u16(),
            headers: resp_headers,
            body,
            from_cache: false,
        })
    }

    /// Like [`RequestClient::request`], but waits for the rate-limit window
    /// to admit the request instead of failing with a local `RateLimited`.
    pub async fn request_queued(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse, RequestError> {
        loop {
            let wait = self.lock_limiter().time_until_available();
            if !wait.is_zero() {
                log::debug!("Rate limit window full; {} waits {}ms", endpoint, wait.as_millis());
                tokio::time::sleep(wait).await;
                continue;
            }
            match self.request(endpoint, options.clone()).await {
                Err(RequestError::RateLimited {
                    origin: RateLimitOrigin::Local,
                }) => tokio::task::yield_now().await,
                other => return other,
            }
        }
    }

    /// [`RequestClient::request`] wrapped in [`with_retry`] using the
    /// configured retry policy.
    pub async fn request_with_retry(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse, RequestError> {
        with_retry(
            || self.request(endpoint, options.clone()),
            RetryPolicy::from(&self.config),
        )
        .await
    }

    /// GET `endpoint` and decode the body.
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, RequestError> {
        self.request(endpoint, RequestOptions::get()).await?.body.json()
    }

    /// POST a JSON body and decode the response.
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, RequestError> {
        self.send_json(Method::POST, endpoint, body).await
    }

    /// PUT a JSON body and decode the response.
    pub async fn put_json<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, RequestError> {
        self.send_json(Method::PUT, endpoint, body).await
    }

    /// DELETE `endpoint` and decode the response.
    pub async fn delete_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, RequestError> {
        self.request(endpoint, RequestOptions::with_method(Method::DELETE, None))
            .await?
            .body
            .json()
    }

    async fn send_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        endpoint: &str,
        body: &B,
    ) -> Result<T, RequestError> {
        let value = serde_json::to_value(body).map_err(|e| RequestError::InvalidInput(e.to_string()))?;
        self.request(endpoint, RequestOptions::with_method(method, Some(value)))
            .await?
            .body
            .json()
    }

    /// Issues every request concurrently. Never fails as a whole; failures
    /// are reported per request in the outcome.
    pub async fn batch(&self, requests: Vec<(String, RequestOptions)>) -> BatchOutcome {
        let total = requests.len();
        let results = join_all(
            requests
                .into_iter()
                .map(|(endpoint, options)| async move { self.request(&endpoint, options).await }),
        )
        .await;

        let mut outcome = BatchOutcome {
            total,
            ..BatchOutcome::default()
        };
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(response) => outcome.values.push(response.body.into_value()),
                Err(e) => outcome.errors.push(format!("Request {} failed: {}", index + 1, e)),
            }
        }
        outcome.successful = outcome.values.len();
        outcome.failed = outcome.errors.len();
        outcome
    }

    /// Current rate-limit quota.
    pub fn usage(&self) -> UsageStats {
        self.lock_limiter().usage()
    }

    /// Drops every cached response.
    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    /// Forgets every request counted by the rate limiter.
    pub fn reset_rate_limit(&self) {
        self.lock_limiter().reset();
    }

    fn build_headers(&self, extra: &HeaderMap) -> Result<HeaderMap, RequestError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(X_CLIENT, header_value(&self.config.client_name)?);
        headers.insert(X_CLIENT_VERSION, header_value(&self.config.client_version)?);
        if let Some(token) = &self.config.api_key {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
        }
        for (name, value) in extra {
            headers.insert(name.clone(), value.clone());
        }
        Ok(headers)
    }

    fn lock_cache(&self) -> MutexGuard<'_, ResponseCache<ResponseBody>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_limiter(&self) -> MutexGuard<'_, RateLimiter> {
        self.limiter.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, RequestError> {
    HeaderValue::from_str(value).map_err(|e| RequestError::InvalidInput(e.to_string()))
}

/// Pulls `message` or `error` out of a JSON error body.
fn error_message(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value
        .get("message")
        .or_else(|| value.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

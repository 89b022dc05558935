//! # Data Retrieval Module
//!
//! The HTTP side of the synchronisation layer: everything needed to fetch
//! dashboard data and classifier results from REST endpoints.
//!
//! ## Contained Modules:
//!
//! - **`cache`**: a TTL response cache with lazy eviction.
//! - **`rate_limiter`**: a sliding-window admission counter.
//! - **`errors`**: the `RequestError` taxonomy and its user-facing wording.
//! - **`ky_http`**: `RequestClient`, built on `reqwest`, tying the cache,
//!   the limiter and a per-call timeout together, plus retry with
//!   exponential backoff, queued admission and batch requests.
//! - **`health`**: a parallel `/health` check over several clients.
//! - **`classifier`**: the typed product-classification API client.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// TTL cache for response bodies.
pub mod cache;
/// Typed client for the product-classification service.
pub mod classifier;
/// Classified request failures.
pub mod errors;
/// Upstream health check.
pub mod health;
/// Request client with cache, rate limiting, timeout and retry.
pub mod ky_http;
/// Sliding-window rate limiter.
pub mod rate_limiter;

pub use cache::{ResponseCache, DEFAULT_TTL};
pub use classifier::{Classification, ClassifierClient, ServiceState, ServiceStatus};
pub use errors::{RateLimitOrigin, RequestError};
pub use health::{health_check, HealthReport, HealthStatus};
pub use ky_http::{
    with_retry, ApiResponse, BatchOutcome, CachePolicy, RequestClient, RequestOptions,
    ResponseBody, RetryPolicy,
};
pub use rate_limiter::{RateLimiter, UsageStats};

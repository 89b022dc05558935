//! # Snapshot Polling Sources
//!
//! In poll mode the controller periodically replaces the whole dashboard
//! with a fresh snapshot. Where that snapshot comes from is abstracted
//! behind [`SnapshotSource`]:
//!
//! - [`HttpSnapshotSource`]: a `GET` through the shared `RequestClient`
//!   (cache, rate limit, timeout and retry included), with the current
//!   filters sent as query parameters.
//! - [`FnSource`]: any async closure, for embedding and tests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::time::Instant;

use crate::model::{DashboardData, DashboardFilters};
use crate::retrieve::{RequestClient, RequestError, RequestOptions};

/// Produces complete dashboard snapshots.
pub trait SnapshotSource: Send + Sync + 'static {
    /// Fetches one snapshot scoped to `filters`.
    fn fetch(&self, filters: &DashboardFilters) -> BoxFuture<'static, Result<DashboardData, RequestError>>;
}

/// # Poll Result
///
/// The outcome of one poll cycle.
#[derive(Debug)]
pub struct PollResult {
    /// The snapshot or the classified failure.
    pub data: Result<DashboardData, RequestError>,
    /// Time spent fetching.
    pub elapsed: Duration,
}

/// Runs one fetch and times it.
pub async fn poll_once(source: &dyn SnapshotSource, filters: &DashboardFilters) -> PollResult {
    let started = Instant::now();
    let data = source.fetch(filters).await;
    let elapsed = started.elapsed();
    match &data {
        Ok(_) => log::debug!("Snapshot fetched in {}ms", elapsed.as_millis()),
        Err(e) => log::warn!("Snapshot fetch failed after {}ms: {}", elapsed.as_millis(), e),
    }
    PollResult { data, elapsed }
}

/// Fetches snapshots from a REST endpoint.
pub struct HttpSnapshotSource {
    client: Arc<RequestClient>,
    endpoint: String,
}

impl HttpSnapshotSource {
    /// `endpoint` is resolved against the client's base URL.
    pub fn new(client: Arc<RequestClient>, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl SnapshotSource for HttpSnapshotSource {
    fn fetch(&self, filters: &DashboardFilters) -> BoxFuture<'static, Result<DashboardData, RequestError>> {
        let client = Arc::clone(&self.client);
        let url = self.client.resolve(&self.endpoint).map(|mut url| {
            url.query_pairs_mut().extend_pairs(filter_query(filters));
            url
        });

        Box::pin(async move {
            let url = url?;
            client
                .request_with_retry(url.as_str(), RequestOptions::get())
                .await?
                .body
                .json()
        })
    }
}

/// Adapts an async closure into a [`SnapshotSource`].
pub struct FnSource<F>(F);

impl<F> FnSource<F> {
    /// Wraps `f`, which is called once per fetch.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F, Fut> SnapshotSource for FnSource<F>
where
    F: Fn(DashboardFilters) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<DashboardData, RequestError>> + Send + 'static,
{
    fn fetch(&self, filters: &DashboardFilters) -> BoxFuture<'static, Result<DashboardData, RequestError>> {
        Box::pin((self.0)(filters.clone()))
    }
}

/// Query parameters describing `filters`; empty lists are omitted.
pub fn filter_query(filters: &DashboardFilters) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::with_capacity(5);
    if let Ok(Value::String(range)) = serde_json::to_value(filters.time_range) {
        pairs.push(("timeRange", range));
    }
    for (name, list) in [
        ("regions", &filters.regions),
        ("commodities", &filters.commodities),
        ("routes", &filters.routes),
    ] {
        if !list.is_empty() {
            pairs.push((name, list.join(",")));
        }
    }
    pairs.push(("showPredictive", filters.show_predictive.to_string()));
    pairs
}

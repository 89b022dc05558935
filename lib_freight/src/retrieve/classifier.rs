//! # Product Classification Client
//!
//! Typed calls against the customs classification service that feeds the
//! dashboard's classifier panel. Every call runs through
//! [`RequestClient::request_with_retry`], so the client's cache, rate
//! limiter and timeout apply. Blank inputs are refused with `InvalidInput`
//! before anything touches the network.

use std::time::Duration;

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::errors::RequestError;
use super::ky_http::{RequestClient, RequestOptions};
use super::rate_limiter::UsageStats;
use crate::configs::ClientConfig;
use crate::model::ClassifierMetrics;

const CLASSIFY_TTL: Duration = Duration::from_secs(5 * 60);
const TARIFF_TTL: Duration = Duration::from_secs(10 * 60);
const MERCEOLOGY_TTL: Duration = Duration::from_secs(30 * 60);
const METRICS_TTL: Duration = Duration::from_secs(30);
const SERVICE_TTL: Duration = Duration::from_secs(60);

/// A competing tariff code for the same description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alternative {
    /// Harmonized System code.
    pub hs_code: String,
    /// Percentage.
    pub confidence: f64,
}

/// One classified product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    /// Harmonized System code.
    pub hs_code: String,
    /// Description the service classified.
    pub description: String,
    /// Percentage.
    pub confidence: f64,
    /// Runner-up codes, best first.
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
    /// Milliseconds spent by the service.
    #[serde(default)]
    pub processing_time: f64,
}

/// Operating status of one classification service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum ServiceState {
    Active,
    Maintenance,
    Degraded,
    Offline,
}

/// Status report of one classification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    /// Service identifier, e.g. `sat-search`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Operating status.
    pub status: ServiceState,
    /// Everything else the service reports (request counters, accuracy...).
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

#[derive(Deserialize)]
struct BatchReply {
    #[serde(default)]
    classifications: Vec<Classification>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidationReply {
    #[serde(default)]
    is_valid: bool,
}

/// # Classifier API Client
pub struct ClassifierClient {
    http: RequestClient,
}

impl ClassifierClient {
    /// Builds the client and its private cache and rate limiter.
    pub fn new(config: ClientConfig) -> Result<Self, RequestError> {
        Ok(Self {
            http: RequestClient::new(config)?,
        })
    }

    /// Wraps an existing request client.
    pub fn with_client(http: RequestClient) -> Self {
        Self { http }
    }

    /// The underlying request client.
    pub fn http(&self) -> &RequestClient {
        &self.http
    }

    /// Classifies a product description. Cached for five minutes per
    /// normalized description.
    pub async fn classify_product(&self, description: &str) -> Result<Classification, RequestError> {
        let description = required(description, "Product description is required")?;
        let key = format!("classify:{}", description.to_lowercase());
        let options = RequestOptions::with_method(
            Method::POST,
            Some(json!({ "description": description })),
        )
        .cached(key, CLASSIFY_TTL);

        self.http.request_with_retry("classify", options).await?.body.json()
    }

    /// Classifies several descriptions in one call.
    pub async fn classify_batch(
        &self,
        descriptions: &[String],
    ) -> Result<Vec<Classification>, RequestError> {
        if descriptions.iter().all(|d| d.trim().is_empty()) {
            return Err(RequestError::InvalidInput(
                "At least one description is required".to_string(),
            ));
        }
        let options = RequestOptions::with_method(
            Method::POST,
            Some(json!({ "descriptions": descriptions })),
        );
        let reply: BatchReply = self
            .http
            .request_with_retry("classify/batch", options)
            .await?
            .body
            .json()?;
        Ok(reply.classifications)
    }

    /// Searches the tariff catalogue. Cached for ten minutes per query.
    pub async fn search_tariff(&self, query: &str) -> Result<Vec<Value>, RequestError> {
        let query = required(query, "Search query is required")?;
        let mut url = self.http.resolve("sat/search")?;
        url.query_pairs_mut().append_pair("q", query);
        let options = RequestOptions::get().cached(format!("sat:{}", query.to_lowercase()), TARIFF_TTL);

        self.http
            .request_with_retry(url.as_str(), options)
            .await?
            .body
            .json()
    }

    /// Asks whether a description is specific enough to classify.
    pub async fn validate_product(&self, description: &str) -> Result<bool, RequestError> {
        let description = required(description, "Product description is required")?;
        let options = RequestOptions::with_method(
            Method::POST,
            Some(json!({ "description": description })),
        );
        let reply: ValidationReply = self
            .http
            .request_with_retry("validate", options)
            .await?
            .body
            .json()?;
        Ok(reply.is_valid)
    }

    /// Merceological notes for an HS code. Cached for thirty minutes.
    pub async fn merceology(&self, hs_code: &str) -> Result<Value, RequestError> {
        let hs_code = required(hs_code, "HS code is required")?;
        let url = self.segment_url(&["merceology", hs_code])?;
        let options = RequestOptions::get().cached(format!("merceology:{}", hs_code), MERCEOLOGY_TTL);

        Ok(self
            .http
            .request_with_retry(url.as_str(), options)
            .await?
            .body
            .into_value())
    }

    /// Aggregate service metrics. Cached for thirty seconds.
    pub async fn metrics(&self) -> Result<ClassifierMetrics, RequestError> {
        let options = RequestOptions::get().cached("metrics", METRICS_TTL);
        self.http.request_with_retry("metrics", options).await?.body.json()
    }

    /// Status of one service. Cached for a minute per service.
    pub async fn service_status(&self, service_id: &str) -> Result<ServiceStatus, RequestError> {
        let service_id = required(service_id, "Service ID is required")?;
        let url = self.segment_url(&["services", service_id, "status"])?;
        let options = RequestOptions::get().cached(format!("service:{}", service_id), SERVICE_TTL);

        self.http
            .request_with_retry(url.as_str(), options)
            .await?
            .body
            .json()
    }

    /// Drops every cached reply.
    pub fn clear_cache(&self) {
        self.http.clear_cache();
    }

    /// Forgets the requests counted against the rate limit.
    pub fn reset_rate_limit(&self) {
        self.http.reset_rate_limit();
    }

    /// Current rate-limit quota.
    pub fn usage(&self) -> UsageStats {
        self.http.usage()
    }

    /// Appends percent-encoded path segments to the base URL.
    fn segment_url(&self, segments: &[&str]) -> Result<Url, RequestError> {
        let mut url = self.http.resolve("")?;
        url.path_segments_mut()
            .map_err(|_| RequestError::InvalidUrl("base URL cannot take path segments".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn required<'a>(value: &'a str, message: &str) -> Result<&'a str, RequestError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RequestError::InvalidInput(message.to_string()));
    }
    Ok(trimmed)
}

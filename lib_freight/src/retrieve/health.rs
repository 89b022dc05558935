//! # Upstream Health Check
//!
//! Checks `/health` on a set of named request clients in parallel and
//! folds the answers into one overall status.

use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::Instant;

use super::ky_http::{RequestClient, RequestOptions};

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Overall verdict across every checked service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every service answered.
    Healthy,
    /// Some services answered.
    Degraded,
    /// No service answered.
    Unhealthy,
}

/// Result of [`health_check`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Overall verdict.
    pub status: HealthStatus,
    /// Per-service reachability.
    pub services: BTreeMap<String, bool>,
    /// Wall time for the whole check.
    #[serde(serialize_with = "as_millis")]
    pub response_time: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Checks every target concurrently. The check bypasses the response cache
/// but counts against each client's rate limit.
pub async fn health_check(targets: &[(&str, &RequestClient)]) -> HealthReport {
    let started = Instant::now();
    let checks = targets.iter().map(|(name, client)| async move {
        let up = match client
            .request("health", RequestOptions::get().timeout(CHECK_TIMEOUT))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Health check for '{}' failed: {}", name, e);
                false
            }
        };
        (name.to_string(), up)
    });
    let services: BTreeMap<String, bool> = join_all(checks).await.into_iter().collect();

    let healthy = services.values().filter(|up| **up).count();
    let status = if healthy == services.len() {
        HealthStatus::Healthy
    } else if healthy > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    };

    HealthReport {
        status,
        services,
        response_time: started.elapsed(),
    }
}

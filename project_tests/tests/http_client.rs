//! RequestClient, ClassifierClient and health checks against a local REST upstream.

mod common;

use std::time::{Duration, Instant};

use lib_freight::retrieve::{
    ClassifierClient, HealthStatus, RateLimitOrigin, RequestClient, RequestError, RequestOptions,
    ResponseBody, ServiceState, health_check,
};
use reqwest::header::{HeaderName, HeaderValue};
use serde_json::{Value, json};

use common::{client_config, spawn_api};

#[tokio::test]
async fn cached_reply_skips_the_network() {
    let (base, upstream) = spawn_api().await;
    let client = RequestClient::new(client_config(&base)).unwrap();
    let options = RequestOptions::get().cached("kpis", Duration::from_secs(60));

    let first = client.request("kpis", options.clone()).await.unwrap();
    let second = client.request("kpis", options.clone()).await.unwrap();
    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.body, second.body);
    assert_eq!(upstream.hits("kpis"), 1);
    assert_eq!(client.usage().requests_this_window, 1);

    client.clear_cache();
    let third = client.request("kpis", options).await.unwrap();
    assert!(!third.from_cache);
    assert_eq!(third.body.into_value()["served"], 2);
}

#[tokio::test]
async fn transient_503_is_retried_until_success() {
    let (base, upstream) = spawn_api().await;
    let client = RequestClient::new(client_config(&base)).unwrap();

    let response = client.request_with_retry("flaky", RequestOptions::get()).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(upstream.hits("flaky"), 3);
}

#[tokio::test]
async fn persistent_503_exhausts_every_attempt() {
    let (base, upstream) = spawn_api().await;
    let client = RequestClient::new(client_config(&base)).unwrap();

    let err = client.request_with_retry("down", RequestOptions::get()).await.unwrap_err();
    match err {
        RequestError::MaxRetriesExceeded { attempts, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(*last, RequestError::ServiceUnavailable { status: 503 });
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(upstream.hits("down"), 3);
}

#[tokio::test]
async fn client_errors_fail_fast_with_their_class() {
    let (base, upstream) = spawn_api().await;
    let client = RequestClient::new(client_config(&base)).unwrap();

    let err = client.request_with_retry("auth", RequestOptions::get()).await.unwrap_err();
    assert_eq!(err, RequestError::Unauthorized { status: 401 });
    assert_eq!(upstream.hits("auth"), 1);

    let err = client.request_with_retry("bad", RequestOptions::get()).await.unwrap_err();
    assert_eq!(
        err,
        RequestError::RequestFailed {
            status: 400,
            message: "bad filter".to_string()
        }
    );
    assert_eq!(err.user_message(), "Invalid input. Please check your data and try again.");
    assert_eq!(upstream.hits("bad"), 1);
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let (base, _upstream) = spawn_api().await;
    let client = RequestClient::new(client_config(&base)).unwrap();

    let started = Instant::now();
    let err = client
        .request("slow", RequestOptions::get().timeout(Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert_eq!(err, RequestError::Timeout(Duration::from_millis(200)));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn local_window_refuses_excess_requests() {
    let (base, upstream) = spawn_api().await;
    let mut config = client_config(&base);
    config.max_requests_per_window = 2;
    let client = RequestClient::new(config).unwrap();

    client.request("kpis", RequestOptions::get()).await.unwrap();
    client.request("kpis", RequestOptions::get()).await.unwrap();
    let err = client.request("kpis", RequestOptions::get()).await.unwrap_err();
    assert_eq!(
        err,
        RequestError::RateLimited {
            origin: RateLimitOrigin::Local
        }
    );
    assert_eq!(upstream.hits("kpis"), 2);
    assert_eq!(client.usage().remaining_requests, 0);

    client.reset_rate_limit();
    assert!(client.request("kpis", RequestOptions::get()).await.is_ok());
}

#[tokio::test]
async fn queued_request_waits_for_the_window() {
    let (base, upstream) = spawn_api().await;
    let mut config = client_config(&base);
    config.max_requests_per_window = 1;
    config.rate_limit_window = Duration::from_millis(300);
    let client = RequestClient::new(config).unwrap();

    client.request("kpis", RequestOptions::get()).await.unwrap();
    let started = Instant::now();
    client.request_queued("kpis", RequestOptions::get()).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(upstream.hits("kpis"), 2);
}

#[tokio::test]
async fn default_headers_and_overrides_reach_the_server() {
    let (base, _upstream) = spawn_api().await;
    let mut config = client_config(&base);
    config.api_key = Some("secret".to_string());
    let client = RequestClient::new(config).unwrap();

    let echoed: Value = client.get_json("echo").await.unwrap();
    assert_eq!(echoed["authorization"], "Bearer secret");
    assert_eq!(echoed["xClient"], "world-freight-dashboard");
    assert_eq!(echoed["xClientVersion"], "2.1.0");
    assert_eq!(echoed["accept"], "application/json");

    let options = RequestOptions::get().header(
        HeaderName::from_static("x-client"),
        HeaderValue::from_static("ops-console"),
    );
    let echoed = client.request("echo", options).await.unwrap().body.into_value();
    assert_eq!(echoed["xClient"], "ops-console");
}

#[tokio::test]
async fn non_json_bodies_are_passed_through_raw() {
    let (base, _upstream) = spawn_api().await;
    let client = RequestClient::new(client_config(&base)).unwrap();

    let response = client.request("text", RequestOptions::get()).await.unwrap();
    assert_eq!(response.body, ResponseBody::Raw("plain text".to_string()));
    assert!(matches!(
        response.body.json::<Value>(),
        Err(RequestError::ParseError(_))
    ));
}

#[tokio::test]
async fn absolute_urls_bypass_the_base() {
    let (base, upstream) = spawn_api().await;
    let client = RequestClient::new(client_config("http://127.0.0.1:9/unused/")).unwrap();

    let absolute = format!("{}kpis", base);
    client.request(&absolute, RequestOptions::get()).await.unwrap();
    assert_eq!(upstream.hits("kpis"), 1);
}

#[tokio::test]
async fn batch_reports_each_request() {
    let (base, _upstream) = spawn_api().await;
    let client = RequestClient::new(client_config(&base)).unwrap();

    let outcome = client
        .batch(vec![
            ("kpis".to_string(), RequestOptions::get()),
            ("auth".to_string(), RequestOptions::get()),
            ("text".to_string(), RequestOptions::get()),
        ])
        .await;
    assert_eq!(outcome.total, 3);
    assert_eq!(outcome.successful, 2);
    assert_eq!(outcome.failed, 1);
    assert!(!outcome.is_success());
    assert!(outcome.errors[0].contains("Request 2 failed"));
}

#[tokio::test]
async fn health_check_reports_partial_outage() {
    let (base, _upstream) = spawn_api().await;
    let up = RequestClient::new(client_config(&base)).unwrap();
    let down = RequestClient::new(client_config("http://127.0.0.1:9/api/")).unwrap();

    let report = health_check(&[("api", &up), ("classifier", &down)]).await;
    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(report.services.get("api"), Some(&true));
    assert_eq!(report.services.get("classifier"), Some(&false));

    let report = health_check(&[("api", &up)]).await;
    assert_eq!(report.status, HealthStatus::Healthy);
}

#[tokio::test]
async fn classifier_normalises_and_caches() {
    let (base, upstream) = spawn_api().await;
    let classifier = ClassifierClient::new(client_config(&format!("{}classifier/", base))).unwrap();

    let first = classifier.classify_product("  Laptop computer ").await.unwrap();
    assert_eq!(first.hs_code, "8471.30");
    assert_eq!(first.description, "Laptop computer");
    assert_eq!(first.alternatives.len(), 1);

    let again = classifier.classify_product("Laptop computer").await.unwrap();
    assert_eq!(again, first);
    assert_eq!(upstream.hits("classify"), 1);

    let status = classifier.service_status("sat-search").await.unwrap();
    assert_eq!(status.status, ServiceState::Degraded);
    assert_eq!(status.details.get("requestsToday"), Some(&json!(1200)));
}

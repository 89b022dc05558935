//! Local upstreams the integration tests talk to: a JSON REST API under
//! `/api` and a scripted WebSocket feed under `/ws`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{
        Path, RawQuery, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use lib_freight::configs::ClientConfig;
use lib_freight::model::KpiData;
use serde_json::{Value, json};
use tokio::sync::mpsc;

/// Counts hits per route and remembers the last query string.
#[derive(Default)]
pub struct Upstream {
    hits: Mutex<HashMap<String, usize>>,
    last_query: Mutex<Option<String>>,
}

impl Upstream {
    fn hit(&self, route: &str) -> usize {
        let mut hits = self.hits.lock().unwrap();
        let n = hits.entry(route.to_string()).or_default();
        *n += 1;
        *n
    }

    pub fn hits(&self, route: &str) -> usize {
        self.hits.lock().unwrap().get(route).copied().unwrap_or(0)
    }

    pub fn last_query(&self) -> Option<String> {
        self.last_query.lock().unwrap().clone()
    }
}

async fn listen(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn kpis(active_flights: u32) -> KpiData {
    KpiData {
        active_flights,
        load_factor: 81.5,
        ..KpiData::default()
    }
}

/// Starts the REST upstream and returns its `/api/` base URL.
pub async fn spawn_api() -> (String, Arc<Upstream>) {
    let upstream = Arc::new(Upstream::default());
    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/kpis", get(kpis_handler))
        .route("/api/flaky", get(flaky_handler))
        .route("/api/down", get(down_handler))
        .route("/api/auth", get(auth_handler))
        .route("/api/bad", get(bad_handler))
        .route("/api/slow", get(slow_handler))
        .route("/api/text", get(|| async { "plain text" }))
        .route("/api/echo", get(echo_handler))
        .route("/api/dashboard", get(dashboard_handler))
        .route("/api/classifier/health", get(|| async { "OK" }))
        .route("/api/classifier/classify", post(classify_handler))
        .route("/api/classifier/services/{id}/status", get(service_handler))
        .with_state(Arc::clone(&upstream));
    let addr = listen(app).await;
    (format!("http://{}/api/", addr), upstream)
}

/// Fast retries and a short timeout so failures resolve quickly.
pub fn client_config(base_url: &str) -> ClientConfig {
    ClientConfig {
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(2),
        retry_base_delay: Duration::from_millis(10),
        retry_max_delay: Duration::from_millis(50),
        ..ClientConfig::default()
    }
}

async fn kpis_handler(State(up): State<Arc<Upstream>>) -> Json<Value> {
    let n = up.hit("kpis");
    Json(json!({ "served": n, "kpis": kpis(n as u32) }))
}

async fn flaky_handler(State(up): State<Arc<Upstream>>) -> impl IntoResponse {
    if up.hit("flaky") < 3 {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "warming up" })))
    } else {
        (StatusCode::OK, Json(json!({ "ok": true })))
    }
}

async fn down_handler(State(up): State<Arc<Upstream>>) -> StatusCode {
    up.hit("down");
    StatusCode::SERVICE_UNAVAILABLE
}

async fn auth_handler(State(up): State<Arc<Upstream>>) -> StatusCode {
    up.hit("auth");
    StatusCode::UNAUTHORIZED
}

async fn bad_handler(State(up): State<Arc<Upstream>>) -> impl IntoResponse {
    up.hit("bad");
    (StatusCode::BAD_REQUEST, Json(json!({ "message": "bad filter" })))
}

async fn slow_handler(State(up): State<Arc<Upstream>>) -> &'static str {
    up.hit("slow");
    tokio::time::sleep(Duration::from_secs(3)).await;
    "late"
}

async fn echo_handler(headers: HeaderMap) -> Json<Value> {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "authorization": get("authorization"),
        "xClient": get("x-client"),
        "xClientVersion": get("x-client-version"),
        "accept": get("accept"),
    }))
}

async fn dashboard_handler(
    State(up): State<Arc<Upstream>>,
    RawQuery(query): RawQuery,
) -> Json<Value> {
    let n = up.hit("dashboard");
    *up.last_query.lock().unwrap() = query;
    Json(json!({
        "kpis": kpis(n as u32),
        "flights": [],
        "routes": [],
        "alerts": []
    }))
}

async fn classify_handler(State(up): State<Arc<Upstream>>, Json(body): Json<Value>) -> Json<Value> {
    up.hit("classify");
    Json(json!({
        "hsCode": "8471.30",
        "description": body["description"],
        "confidence": 97.5,
        "alternatives": [{ "hsCode": "8471.41", "confidence": 61.0 }]
    }))
}

async fn service_handler(Path(id): Path<String>) -> Json<Value> {
    Json(json!({
        "id": id,
        "name": "SAT search",
        "status": "degraded",
        "requestsToday": 1200
    }))
}

/// A scripted push feed.
pub struct Feed {
    frames: Vec<String>,
    close_first: bool,
    connections: AtomicUsize,
    received: mpsc::UnboundedSender<String>,
}

impl Feed {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Starts a feed that sends `frames` on every connection and, when
/// `close_first` is set, closes the first connection right after.
/// Returns the `ws://` URL, the feed and a receiver of client frames.
pub async fn spawn_feed(
    frames: Vec<String>,
    close_first: bool,
) -> (String, Arc<Feed>, mpsc::UnboundedReceiver<String>) {
    let (received, rx) = mpsc::unbounded_channel();
    let feed = Arc::new(Feed {
        frames,
        close_first,
        connections: AtomicUsize::new(0),
        received,
    });
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(Arc::clone(&feed));
    let addr = listen(app).await;
    (format!("ws://{}/ws", addr), feed, rx)
}

async fn ws_handler(ws: WebSocketUpgrade, State(feed): State<Arc<Feed>>) -> impl IntoResponse {
    ws.protocols(["freight.v1"])
        .on_upgrade(move |socket| serve_feed(socket, feed))
}

async fn serve_feed(mut socket: WebSocket, feed: Arc<Feed>) {
    let n = feed.connections.fetch_add(1, Ordering::SeqCst) + 1;
    for frame in &feed.frames {
        if socket.send(Message::Text(frame.clone().into())).await.is_err() {
            return;
        }
    }
    if feed.close_first && n == 1 {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    while let Some(Ok(msg)) = socket.recv().await {
        if let Message::Text(text) = msg {
            let _ = feed.received.send(text.as_str().to_owned());
        }
    }
}

/// A `{type, data, timestamp}` envelope.
pub fn frame(kind: &str, data: Value) -> String {
    json!({ "type": kind, "data": data, "timestamp": 1_700_000_000_000u64 }).to_string()
}

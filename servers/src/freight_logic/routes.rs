//! # Dashboard HTTP Surface
//!
//! JSON routes over the sync controller and the REST clients. Every
//! handler returns either the current `SyncState` or a small JSON body;
//! failures go through [`AppError`] so the status code reflects the error
//! class.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use lib_freight::core::{SyncController, SyncError, SyncMode, SyncState};
use lib_freight::ingestors::{SocketError, Visibility};
use lib_freight::model::FilterUpdate;
use lib_freight::retrieve::classifier::{Classification, ClassifierClient};
use lib_freight::retrieve::health::{HealthStatus, health_check};
use lib_freight::retrieve::{RequestClient, RequestError};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub controller: SyncController,
    pub api: Arc<RequestClient>,
    pub classifier: Arc<ClassifierClient>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Request(#[from] RequestError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Sync(SyncError::NoSource | SyncError::NotRunning) => StatusCode::CONFLICT,
            AppError::Sync(SyncError::Socket(SocketError::InvalidUrl(_))) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Sync(SyncError::Socket(_)) => StatusCode::BAD_GATEWAY,
            AppError::Sync(SyncError::Request(e)) | AppError::Request(e) => request_status(e),
        }
    }

    fn user_message(&self) -> &'static str {
        match self {
            AppError::Sync(SyncError::Request(e)) | AppError::Request(e) => e.user_message(),
            AppError::Sync(SyncError::NoSource) => "Polling is not available on this server.",
            AppError::Sync(SyncError::NotRunning) => "Sync is stopped. Choose a mode first.",
            AppError::Sync(SyncError::Socket(_)) => "Live feed unavailable.",
        }
    }
}

fn request_status(e: &RequestError) -> StatusCode {
    match e {
        RequestError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        RequestError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        RequestError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        RequestError::MaxRetriesExceeded { last, .. } => request_status(last),
        RequestError::InvalidUrl(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        } else {
            log::warn!("Request rejected: {}", self);
        }
        let body = json!({
            "message": self.to_string(),
            "userMessage": self.user_message(),
        });
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/state", get(state_handler))
        .route("/usage", get(usage_handler))
        .route("/refresh", post(refresh_handler))
        .route("/retry", post(retry_handler))
        .route("/stop", post(stop_handler))
        .route("/filters", post(filters_handler))
        .route("/mode/{mode}", post(mode_handler))
        .route("/visibility/{visibility}", post(visibility_handler))
        .route("/classify", post(classify_handler))
        .with_state(state)
}

/// Checks both upstream APIs; `503` when neither answers.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let report = health_check(&[("api", &*state.api), ("classifier", state.classifier.http())]).await;
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(report))
}

async fn state_handler(State(state): State<AppState>) -> Json<SyncState> {
    Json(state.controller.snapshot())
}

async fn usage_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "api": state.api.usage(),
        "classifier": state.classifier.usage(),
    }))
}

async fn refresh_handler(State(state): State<AppState>) -> Result<Json<SyncState>, AppError> {
    state.controller.refresh().await?;
    Ok(Json(state.controller.snapshot()))
}

async fn retry_handler(State(state): State<AppState>) -> Result<Json<SyncState>, AppError> {
    state.controller.retry_connection().await?;
    Ok(Json(state.controller.snapshot()))
}

async fn stop_handler(State(state): State<AppState>) -> Json<SyncState> {
    state.controller.stop().await;
    Json(state.controller.snapshot())
}

async fn filters_handler(
    State(state): State<AppState>,
    Json(update): Json<FilterUpdate>,
) -> Json<SyncState> {
    state.controller.update_filters(update);
    Json(state.controller.snapshot())
}

async fn mode_handler(
    State(state): State<AppState>,
    Path(mode): Path<SyncMode>,
) -> Result<Json<SyncState>, AppError> {
    state.controller.start(mode).await?;
    Ok(Json(state.controller.snapshot()))
}

async fn visibility_handler(
    State(state): State<AppState>,
    Path(visibility): Path<Visibility>,
) -> Result<StatusCode, AppError> {
    state.controller.set_visibility(visibility).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ClassifyRequest {
    description: String,
}

async fn classify_handler(
    State(state): State<AppState>,
    Json(request): Json<ClassifyRequest>,
) -> Result<Json<Classification>, AppError> {
    Ok(Json(state.classifier.classify_product(&request.description).await?))
}

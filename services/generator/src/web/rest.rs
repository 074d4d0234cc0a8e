//! services/generator/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints.

use crate::orchestrator::AutoRetryState;
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use devotional_core::{Day, GeneratedSeries, GenerationContext, GenerationSession, JobError, Series};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ContinueRequest {
    #[serde(default)]
    pub requested_total: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContinueResponse {
    pub days: Vec<Day>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveResponse {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConnectivityRequest {
    pub online: bool,
}

/// The JSON body of every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    pub retriable: bool,
}

/// A `JobError` rendered as an HTTP response.
pub struct ApiError(pub JobError);

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            JobError::NotFound(_) => StatusCode::NOT_FOUND,
            JobError::Connectivity(_) => StatusCode::GATEWAY_TIMEOUT,
            JobError::ContentFilterExhausted(_) => StatusCode::UNPROCESSABLE_ENTITY,
            JobError::UpstreamUnavailable(_) | JobError::Unauthorized(_) | JobError::InvalidResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
            JobError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            JobError::Storage(_) | JobError::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(kind = self.0.kind(), error = %self.0, "Request failed");
        }
        let body = ErrorBody {
            kind: self.0.kind().to_string(),
            message: self.0.to_string(),
            retriable: self.0.is_retriable(),
        };
        (status, Json(body)).into_response()
    }
}

fn not_found(what: String) -> ApiError {
    ApiError(JobError::NotFound(what))
}

//=========================================================================================
// Series Handlers
//=========================================================================================

/// Generates a new series and returns it once every day is stored.
pub async fn generate_handler(
    State(app_state): State<Arc<AppState>>,
    Json(context): Json<GenerationContext>,
) -> Result<(StatusCode, Json<GeneratedSeries>), ApiError> {
    let series = app_state.service.generate(context).await?;
    Ok((StatusCode::CREATED, Json(series)))
}

pub async fn get_series_handler(
    State(app_state): State<Arc<AppState>>,
    Path(series_id): Path<Uuid>,
) -> Result<Json<Series>, ApiError> {
    Ok(Json(app_state.service.series(series_id).await?))
}

/// Generates the missing days of a series. A retriable failure hands the
/// series to the auto-retry scheduler before the error is returned.
pub async fn continue_handler(
    State(app_state): State<Arc<AppState>>,
    Path(series_id): Path<Uuid>,
    Json(request): Json<ContinueRequest>,
) -> Result<Json<ContinueResponse>, ApiError> {
    match app_state
        .service
        .continue_with_deadline(series_id, request.requested_total)
        .await
    {
        Ok(days) => Ok(Json(ContinueResponse { days })),
        Err(err) => {
            if err.is_retriable() {
                app_state.ensure_watcher(series_id, request.requested_total);
            }
            Err(err.into())
        }
    }
}

pub async fn mark_read_handler(
    State(app_state): State<Arc<AppState>>,
    Path((series_id, day_number)): Path<(Uuid, u32)>,
) -> Result<Json<Day>, ApiError> {
    Ok(Json(app_state.service.mark_read(series_id, day_number).await?))
}

//=========================================================================================
// Job Handlers
//=========================================================================================

pub async fn get_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(series_id): Path<Uuid>,
) -> Result<Json<GenerationSession>, ApiError> {
    app_state
        .service
        .session(series_id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("No generation session for series {}", series_id)))
}

pub async fn clear_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(series_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    app_state.service.clear_session(series_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn active_handler(
    State(app_state): State<Arc<AppState>>,
    Path(series_id): Path<Uuid>,
) -> Json<ActiveResponse> {
    Json(ActiveResponse {
        active: app_state.service.is_active(series_id),
    })
}

pub async fn auto_retry_handler(
    State(app_state): State<Arc<AppState>>,
    Path(series_id): Path<Uuid>,
) -> Result<Json<AutoRetryState>, ApiError> {
    app_state
        .watcher_state(series_id)
        .map(Json)
        .ok_or_else(|| not_found(format!("No auto-retry watcher for series {}", series_id)))
}

/// Manual retry. Always allowed, whatever the last failure was.
pub async fn retry_handler(
    State(app_state): State<Arc<AppState>>,
    Path(series_id): Path<Uuid>,
    Json(request): Json<ContinueRequest>,
) -> Result<(StatusCode, Json<AutoRetryState>), ApiError> {
    // Fail fast on an unknown series instead of starting a watcher for it.
    app_state.service.series(series_id).await?;
    let state = app_state.retry(series_id, request.requested_total);
    Ok((StatusCode::ACCEPTED, Json(state)))
}

pub async fn connectivity_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<ConnectivityRequest>,
) -> StatusCode {
    app_state.set_online(request.online);
    StatusCode::NO_CONTENT
}

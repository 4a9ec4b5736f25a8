//! Staging endpoints
//!
//! PUT /staging stages a guest capture, DELETE /staging discards it. Both
//! go through the flush coordinator and answer 409 while a flush runs.

use axum::{extract::State, http::StatusCode, routing::put, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::GuestCapture;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct StageRequest {
    #[serde(default)]
    pub answers: Map<String, Value>,
    #[serde(default)]
    pub front_image: String,
    #[serde(default)]
    pub side_image: String,
}

#[derive(Debug, Serialize)]
pub struct StageResponse {
    pub staged: bool,
}

pub async fn stage_capture(
    State(state): State<AppState>,
    Json(request): Json<StageRequest>,
) -> ApiResult<(StatusCode, Json<StageResponse>)> {
    let capture = GuestCapture::new(request.answers, request.front_image, request.side_image);
    if !state.coordinator.stage(&capture).await? {
        return Err(ApiError::BadRequest(
            "Capture needs both a front and a side image".to_string(),
        ));
    }
    Ok((StatusCode::CREATED, Json(StageResponse { staged: true })))
}

pub async fn reset_staging(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.coordinator.reset().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn staging_routes() -> Router<AppState> {
    Router::new().route("/staging", put(stage_capture).delete(reset_staging))
}

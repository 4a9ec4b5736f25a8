//! Session endpoints
//!
//! POST /session signs an owner in, DELETE /session signs out.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub owner_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub owner_id: Option<String>,
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let owner_id = request.owner_id.trim();
    if owner_id.is_empty() {
        return Err(ApiError::BadRequest("owner_id must not be empty".to_string()));
    }
    state.sessions.sign_in(owner_id).await;
    Ok(Json(SessionResponse {
        owner_id: Some(owner_id.to_string()),
    }))
}

pub async fn sign_out(State(state): State<AppState>) -> StatusCode {
    state.sessions.sign_out().await;
    StatusCode::NO_CONTENT
}

pub async fn current_session(State(state): State<AppState>) -> Json<SessionResponse> {
    Json(SessionResponse {
        owner_id: state.sessions.current_owner().await,
    })
}

pub fn session_routes() -> Router<AppState> {
    Router::new().route(
        "/session",
        post(sign_in).delete(sign_out).get(current_session),
    )
}

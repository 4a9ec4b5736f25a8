//! Profile endpoint
//!
//! PUT /profile upserts the signed-in owner's onboarding state and answers.

use axum::{extract::State, routing::put, Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::require_owner;
use crate::db::profiles;
use crate::models::Profile;
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub onboarding_completed: bool,
    #[serde(default)]
    pub answers: Map<String, Value>,
}

pub async fn put_profile(
    State(state): State<AppState>,
    Json(request): Json<ProfileRequest>,
) -> ApiResult<Json<Profile>> {
    let owner_id = require_owner(&state).await?;
    let profile = Profile::new(owner_id, request.onboarding_completed, request.answers);
    profiles::upsert_profile(&state.db, &profile).await?;
    tracing::info!(
        owner_id = %profile.owner_id,
        onboarding_completed = profile.onboarding_completed,
        "Profile saved"
    );
    Ok(Json(profile))
}

pub async fn get_profile(State(state): State<AppState>) -> ApiResult<Json<Profile>> {
    let owner_id = require_owner(&state).await?;
    profiles::load_profile(&state.db, &owner_id)
        .await?
        .map(Json)
        .ok_or_else(|| crate::ApiError::NotFound(format!("profile for {}", owner_id)))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/profile", put(put_profile).get(get_profile))
}

//! Scan listing endpoint

use axum::{extract::State, routing::get, Json, Router};

use super::require_owner;
use crate::db::scans;
use crate::models::ScanRecord;
use crate::{ApiResult, AppState};

/// GET /scans - the signed-in owner's scans, newest first
pub async fn list_scans(State(state): State<AppState>) -> ApiResult<Json<Vec<ScanRecord>>> {
    let owner_id = require_owner(&state).await?;
    Ok(Json(scans::list_scans(&state.db, &owner_id).await?))
}

pub fn scan_routes() -> Router<AppState> {
    Router::new().route("/scans", get(list_scans))
}

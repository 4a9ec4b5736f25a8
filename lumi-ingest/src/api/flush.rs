//! Flush endpoint
//!
//! POST /flush runs the coordinator once. "Nothing staged" and "already in
//! flight" are successful no-ops, not errors.

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;

use crate::models::ScanRecord;
use crate::workflow::FlushOutcome;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FlushResponse {
    Completed { scan: ScanRecord },
    NothingStaged,
    AlreadyInFlight,
}

impl From<FlushOutcome> for FlushResponse {
    fn from(outcome: FlushOutcome) -> Self {
        match outcome {
            FlushOutcome::Completed(scan) => FlushResponse::Completed { scan },
            FlushOutcome::NothingStaged => FlushResponse::NothingStaged,
            FlushOutcome::AlreadyInFlight => FlushResponse::AlreadyInFlight,
        }
    }
}

pub async fn flush(State(state): State<AppState>) -> ApiResult<Json<FlushResponse>> {
    match state.coordinator.flush_once().await {
        Ok(outcome) => Ok(Json(outcome.into())),
        Err(e) => {
            *state.last_error.write().await = Some(e.to_string());
            Err(ApiError::from(e))
        }
    }
}

pub fn flush_routes() -> Router<AppState> {
    Router::new().route("/flush", post(flush))
}

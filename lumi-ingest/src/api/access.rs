//! Access stage endpoints
//!
//! GET /access reports the gathered facts and resolved stage;
//! GET /access/guard decides a single navigation.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use lumi_common::access::{self, AccessFacts, GuardDecision, Stage};
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub facts: AccessFacts,
    pub stage: Stage,
    pub route: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct GuardQuery {
    pub destination: String,
}

pub async fn get_access(State(state): State<AppState>) -> Json<AccessResponse> {
    let facts = state.access.gather().await;
    let stage = access::resolve(facts);
    Json(AccessResponse {
        facts,
        stage,
        route: stage.route(),
    })
}

pub async fn guard_destination(
    State(state): State<AppState>,
    Query(query): Query<GuardQuery>,
) -> Json<GuardDecision> {
    let facts = state.access.gather().await;
    let decision = access::guard(&query.destination, facts);
    if let GuardDecision::Redirect { to, .. } = &decision {
        tracing::debug!(destination = %query.destination, redirect = %to, "Guard redirect");
    }
    Json(decision)
}

pub fn access_routes() -> Router<AppState> {
    Router::new()
        .route("/access", get(get_access))
        .route("/access/guard", get(guard_destination))
}

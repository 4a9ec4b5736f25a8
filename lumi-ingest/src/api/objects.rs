//! Signed object reads
//!
//! GET /objects/*path?expires=&sig= serves a stored image to whoever holds
//! a valid read access reference.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ReadAccessQuery {
    pub expires: i64,
    pub sig: String,
}

pub async fn get_object(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<ReadAccessQuery>,
) -> ApiResult<impl IntoResponse> {
    state
        .objects
        .verify_read_access(&path, query.expires, &query.sig)?;
    let bytes = state.objects.read_object(&path).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes))
}

pub fn object_routes() -> Router<AppState> {
    Router::new().route("/objects/*path", get(get_object))
}

//! Server-Sent Events for ingestion progress

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    lumi_common::sse::create_event_sse_stream("lumi-ingest", &state.event_bus)
}

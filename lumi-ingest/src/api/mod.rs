//! HTTP API handlers for lumi-ingest

pub mod access;
pub mod flush;
pub mod health;
pub mod objects;
pub mod profile;
pub mod scans;
pub mod session;
pub mod sse;
pub mod staging;

pub use access::access_routes;
pub use flush::flush_routes;
pub use health::health_routes;
pub use objects::object_routes;
pub use profile::profile_routes;
pub use scans::scan_routes;
pub use session::session_routes;
pub use sse::event_stream;
pub use staging::staging_routes;

use crate::{ApiError, ApiResult, AppState};

/// Owner of the current session, or 401
pub(crate) async fn require_owner(state: &AppState) -> ApiResult<String> {
    state
        .sessions
        .current_owner()
        .await
        .ok_or_else(|| ApiError::Unauthorized("No signed-in owner".to_string()))
}

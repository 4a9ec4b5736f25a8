//! lumi-ingest library
//!
//! Device-local ingestion service: stages a guest capture, and once the
//! owner is signed in and entitled, runs it through the ingestion pipeline
//! exactly once.

pub mod access;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod staging;
pub mod utils;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use crate::access::AccessFactsProvider;
use crate::services::{
    AnalysisService, EntitlementGate, LocalObjectStorage, ObjectStorage, PlanGenerator,
    SessionStore,
};
use crate::staging::StagingStore;
use crate::workflow::{FlushCoordinator, IngestionPipeline, PipelineSettings, ScanStore};
use axum::Router;
use chrono::{DateTime, Utc};
use lumi_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

/// Collaborators of the pipeline, swapped for fakes in tests
pub struct Services {
    pub gate: EntitlementGate,
    /// Where the pipeline uploads and issues read access
    pub storage: Arc<dyn ObjectStorage>,
    /// Local store behind the `/objects` route
    pub objects: Arc<LocalObjectStorage>,
    pub analysis: Arc<dyn AnalysisService>,
    pub scans: Arc<dyn ScanStore>,
    pub plans: Arc<dyn PlanGenerator>,
    pub staging: StagingStore,
    pub settings: PipelineSettings,
}

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub sessions: SessionStore,
    pub access: AccessFactsProvider,
    pub coordinator: Arc<FlushCoordinator>,
    pub objects: Arc<LocalObjectStorage>,
    pub startup_time: DateTime<Utc>,
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Wire the pipeline, coordinator and access provider together
    pub fn assemble(db: SqlitePool, event_bus: EventBus, services: Services) -> Self {
        let sessions = SessionStore::new();

        let pipeline = Arc::new(IngestionPipeline::new(
            services.gate.clone(),
            services.storage,
            services.analysis,
            services.scans,
            services.plans,
            event_bus.clone(),
            services.settings,
        ));
        let coordinator = Arc::new(FlushCoordinator::new(
            services.staging,
            pipeline,
            sessions.clone(),
            event_bus.clone(),
        ));
        let access = AccessFactsProvider::new(db.clone(), sessions.clone(), services.gate);

        Self {
            db,
            event_bus,
            sessions,
            access,
            coordinator,
            objects: services.objects,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::session_routes())
        .merge(api::access_routes())
        .merge(api::profile_routes())
        .merge(api::staging_routes())
        .merge(api::flush_routes())
        .merge(api::scan_routes())
        .merge(api::object_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

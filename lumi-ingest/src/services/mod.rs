//! Service clients used by the ingestion workflow

pub mod analysis_client;
pub mod entitlement;
pub mod object_storage;
pub mod plan_generator;
pub mod session;

pub use analysis_client::{
    AnalysisError, AnalysisRequest, AnalysisResponse, AnalysisService, HttpAnalysisClient,
    UnconfiguredAnalysisService,
};
pub use entitlement::{
    EntitlementGate, EntitlementSource, EntitlementSourceError, FixedEntitlementSource,
    HttpEntitlementSource, PaymentRequired,
};
pub use object_storage::{
    owner_segment, scan_object_path, ImageSide, LocalObjectStorage, ObjectStorage, ReadAccess,
    StorageError,
};
pub use plan_generator::{DisabledPlanGenerator, HttpPlanGenerator, PlanGenerationError, PlanGenerator};
pub use session::SessionStore;

/// User agent sent to every external service
pub const USER_AGENT: &str = concat!("lumi-ingest/", env!("CARGO_PKG_VERSION"));

//! Ingestion workflow
//!
//! [`pipeline::IngestionPipeline`] turns one capture into one ScanRecord;
//! [`flush::FlushCoordinator`] decides when that happens and owns staging.

pub mod flush;
pub mod pipeline;

pub use flush::FlushCoordinator;
pub use pipeline::{IngestionPipeline, PipelineSettings};

use crate::models::ScanRecord;
use crate::services::{AnalysisError, PaymentRequired, StorageError};
use crate::staging::StagingError;
use async_trait::async_trait;
use lumi_common::events::IngestStep;
use lumi_common::score::NormalizationError;
use thiserror::Error;

/// Fatal pipeline failure, naming the step that failed
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Not signed in")]
    Auth,

    #[error("Payment required: {0}")]
    PaymentRequired(#[from] PaymentRequired),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Read access issuance failed: {0}")]
    AccessIssuance(String),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Normalization failed: {0}")]
    Normalization(#[from] NormalizationError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] lumi_common::Error),
}

impl IngestionError {
    pub fn step(&self) -> IngestStep {
        match self {
            IngestionError::Auth | IngestionError::PaymentRequired(_) => IngestStep::Gate,
            IngestionError::Upload(_) => IngestStep::Upload,
            IngestionError::AccessIssuance(_) => IngestStep::AccessIssuance,
            IngestionError::Analysis(_) => IngestStep::Analysis,
            IngestionError::Normalization(_) => IngestStep::Normalize,
            IngestionError::Persistence(_) => IngestStep::Persist,
        }
    }

    pub(crate) fn upload(e: impl std::fmt::Display) -> Self {
        IngestionError::Upload(e.to_string())
    }

    pub(crate) fn access_issuance(e: StorageError) -> Self {
        IngestionError::AccessIssuance(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum FlushError {
    #[error("Not signed in")]
    Auth,

    #[error("Payment required: {0}")]
    PaymentRequired(PaymentRequired),

    #[error("Ingestion failed at {step}: {0}", step = .0.step())]
    Ingestion(IngestionError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error("A flush is in progress")]
    FlushInProgress,
}

impl From<IngestionError> for FlushError {
    fn from(e: IngestionError) -> Self {
        match e {
            IngestionError::Auth => FlushError::Auth,
            IngestionError::PaymentRequired(reason) => FlushError::PaymentRequired(reason),
            other => FlushError::Ingestion(other),
        }
    }
}

/// Result of one flush request
#[derive(Debug)]
pub enum FlushOutcome {
    /// Pipeline committed a ScanRecord and staging was cleared
    Completed(ScanRecord),
    /// Nothing complete in staging
    NothingStaged,
    /// Another flush holds the token
    AlreadyInFlight,
}

/// Commit point of the pipeline
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Insert `record` in a single atomic write
    async fn insert_scan(&self, record: &ScanRecord) -> lumi_common::Result<()>;
}

//! Ingestion pipeline
//!
//! Turns one guest capture into one committed ScanRecord.
//!
//! # Steps
//! 1. **Gate**: entitlement check, before any I/O
//! 2. **Upload**: both images to object storage under a fresh scan id
//! 3. **Access issuance**: short-lived read references (never persisted)
//! 4. **Analysis**: external service call, response validated
//! 5. **Normalize**: raw scores to a ScoreVector
//! 6. **Persist**: single INSERT, the commit point
//! 7. **Derive plan**: best effort, failures logged and swallowed
//!
//! Steps run strictly in order and none is retried here. Everything before
//! Persist can be repeated from scratch; a retry uploads under a new scan id.

use super::{IngestionError, ScanStore};
use crate::models::{decode_image, GuestCapture, ScanRecord};
use crate::services::{
    scan_object_path, AnalysisError, AnalysisRequest, AnalysisService, EntitlementGate,
    ImageSide, ObjectStorage, PlanGenerator, StorageError,
};
use chrono::Utc;
use lumi_common::config::TomlConfig;
use lumi_common::events::{EventBus, IngestEvent, IngestStep};
use lumi_common::score;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Time limits of the pipeline's external calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub read_access_ttl: Duration,
    pub access_issue_timeout: Duration,
    pub analysis_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            read_access_ttl: Duration::from_secs(3600),
            access_issue_timeout: Duration::from_secs(10),
            analysis_timeout: Duration::from_secs(60),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            read_access_ttl: Duration::from_secs(config.storage.read_access_ttl_secs),
            access_issue_timeout: Duration::from_secs(config.storage.issue_timeout_secs),
            analysis_timeout: Duration::from_secs(config.analysis.timeout_secs),
        }
    }
}

pub struct IngestionPipeline {
    gate: EntitlementGate,
    storage: Arc<dyn ObjectStorage>,
    analysis: Arc<dyn AnalysisService>,
    scans: Arc<dyn ScanStore>,
    plans: Arc<dyn PlanGenerator>,
    event_bus: EventBus,
    settings: PipelineSettings,
}

impl IngestionPipeline {
    pub fn new(
        gate: EntitlementGate,
        storage: Arc<dyn ObjectStorage>,
        analysis: Arc<dyn AnalysisService>,
        scans: Arc<dyn ScanStore>,
        plans: Arc<dyn PlanGenerator>,
        event_bus: EventBus,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            gate,
            storage,
            analysis,
            scans,
            plans,
            event_bus,
            settings,
        }
    }

    pub fn gate(&self) -> &EntitlementGate {
        &self.gate
    }

    /// Run all steps for `capture` on behalf of `owner_id`
    pub async fn ingest(
        &self,
        capture: &GuestCapture,
        owner_id: &str,
    ) -> Result<ScanRecord, IngestionError> {
        self.run_step(None, IngestStep::Gate, async {
            if owner_id.trim().is_empty() {
                return Err(IngestionError::Auth);
            }
            self.gate.require_entitlement(owner_id).await?;
            Ok::<_, IngestionError>(())
        })
        .await?;

        let scan_id = Uuid::new_v4();
        let front_path = scan_object_path(owner_id, scan_id, ImageSide::Front);
        let side_path = scan_object_path(owner_id, scan_id, ImageSide::Side);
        info!(owner_id = %owner_id, scan_id = %scan_id, "Ingesting capture");

        self.run_step(Some(scan_id), IngestStep::Upload, async {
            let front = decode_image(&capture.front_image).map_err(IngestionError::upload)?;
            let side = decode_image(&capture.side_image).map_err(IngestionError::upload)?;
            self.storage
                .put_object(&front_path, front)
                .await
                .map_err(IngestionError::upload)?;
            self.storage
                .put_object(&side_path, side)
                .await
                .map_err(IngestionError::upload)?;
            Ok::<_, IngestionError>(())
        })
        .await?;

        let (front_access, side_access) = self
            .run_step(Some(scan_id), IngestStep::AccessIssuance, async {
                let ttl = self.settings.read_access_ttl;
                let issue = async {
                    let front = self.storage.issue_read_access(&front_path, ttl).await?;
                    let side = self.storage.issue_read_access(&side_path, ttl).await?;
                    Ok::<_, StorageError>((front, side))
                };
                match tokio::time::timeout(self.settings.access_issue_timeout, issue).await {
                    Ok(result) => result.map_err(IngestionError::access_issuance),
                    Err(_) => Err(IngestionError::AccessIssuance(format!(
                        "timed out after {:?}",
                        self.settings.access_issue_timeout
                    ))),
                }
            })
            .await?;

        let demographics = capture.demographics();
        let request = AnalysisRequest {
            front_image_url: front_access.url,
            side_image_url: side_access.url,
            age: demographics.age,
            sex: demographics.sex,
        };
        let response = self
            .run_step(Some(scan_id), IngestStep::Analysis, async {
                let timeout = self.settings.analysis_timeout;
                match tokio::time::timeout(timeout, self.analysis.analyze(&request)).await {
                    Ok(result) => result.map_err(IngestionError::from),
                    Err(_) => Err(IngestionError::from(AnalysisError::Timeout(timeout))),
                }
            })
            .await?;

        let score_vector = self
            .run_step(Some(scan_id), IngestStep::Normalize, async {
                score::normalize(&response.scores).map_err(IngestionError::from)
            })
            .await?;

        let record = ScanRecord {
            id: scan_id,
            owner_id: owner_id.to_string(),
            front_image_ref: front_path,
            side_image_ref: side_path,
            classification: response.classification,
            score_vector,
            analysis_notes: response.notes,
            created_at: Utc::now(),
        };

        self.run_step(Some(scan_id), IngestStep::Persist, async {
            self.scans
                .insert_scan(&record)
                .await
                .map_err(IngestionError::from)
        })
        .await?;

        info!(
            owner_id = %owner_id,
            scan_id = %scan_id,
            overall = record.score_vector.overall(),
            "Scan committed"
        );
        self.event_bus.emit_lossy(IngestEvent::ScanCommitted {
            scan_id,
            owner_id: owner_id.to_string(),
            overall: record.score_vector.overall(),
            timestamp: Utc::now(),
        });

        self.derive_plan(&record).await;
        Ok(record)
    }

    /// Best-effort plan generation. Never affects the outcome.
    async fn derive_plan(&self, record: &ScanRecord) {
        // Failure is logged and emitted by run_step
        let _ = self
            .run_step(
                Some(record.id),
                IngestStep::DerivePlan,
                self.plans.generate(record),
            )
            .await;
    }

    async fn run_step<T, E, F>(
        &self,
        scan_id: Option<Uuid>,
        step: IngestStep,
        work: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.emit_started(scan_id, step);
        let result = work.await;
        match &result {
            Ok(_) => self.emit_completed(scan_id, step),
            Err(e) => {
                if step.is_fatal() {
                    warn!(step = %step, scan_id = ?scan_id, "Ingestion step failed: {}", e);
                } else {
                    warn!(
                        step = %step,
                        scan_id = ?scan_id,
                        "Non-fatal step failed, continuing: {}",
                        e
                    );
                }
                self.emit_failed(scan_id, step, e.to_string());
            }
        }
        result
    }

    fn emit_started(&self, scan_id: Option<Uuid>, step: IngestStep) {
        debug!(step = %step, scan_id = ?scan_id, "Step started");
        self.event_bus.emit_lossy(IngestEvent::StepStarted {
            scan_id,
            step,
            timestamp: Utc::now(),
        });
    }

    fn emit_completed(&self, scan_id: Option<Uuid>, step: IngestStep) {
        self.event_bus.emit_lossy(IngestEvent::StepCompleted {
            scan_id,
            step,
            timestamp: Utc::now(),
        });
    }

    fn emit_failed(&self, scan_id: Option<Uuid>, step: IngestStep, message: String) {
        self.event_bus.emit_lossy(IngestEvent::StepFailed {
            scan_id,
            step,
            message,
            timestamp: Utc::now(),
        });
    }
}

//! Flush coordinator
//!
//! Moves the staged capture through the pipeline once the owner is signed
//! in and entitled. At most one flush runs at a time; a concurrent request
//! returns [`FlushOutcome::AlreadyInFlight`] instead of queueing, since the
//! running flush clears staging itself on success.
//!
//! The coordinator is the only writer of staging: `stage` and `reset` are
//! refused while a flush holds the token. Staging reads and writes of
//! image payloads run on the blocking pool.

use super::{FlushError, FlushOutcome, IngestionPipeline};
use crate::models::GuestCapture;
use crate::services::SessionStore;
use crate::staging::{StagingError, StagingStore};
use chrono::Utc;
use lumi_common::events::{EventBus, FlushSkipReason, IngestEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Releases the flush token on every exit path
struct FlushGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct FlushCoordinator {
    staging: StagingStore,
    pipeline: Arc<IngestionPipeline>,
    sessions: SessionStore,
    event_bus: EventBus,
    in_flight: AtomicBool,
    /// Serializes staging writes against the flush's load and clear
    writer: Mutex<()>,
}

impl FlushCoordinator {
    pub fn new(
        staging: StagingStore,
        pipeline: Arc<IngestionPipeline>,
        sessions: SessionStore,
        event_bus: EventBus,
    ) -> Self {
        Self {
            staging,
            pipeline,
            sessions,
            event_bus,
            in_flight: AtomicBool::new(false),
            writer: Mutex::new(()),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn has_staged_capture(&self) -> bool {
        self.staging.has_complete()
    }

    /// Try to ingest the staged capture.
    ///
    /// Staging is cleared only after the ScanRecord is committed; on any
    /// error it is left intact for a later retry.
    pub async fn flush_once(&self) -> Result<FlushOutcome, FlushError> {
        if !self.staging.has_complete() {
            debug!("Flush requested with nothing staged");
            self.emit_skipped(FlushSkipReason::NothingStaged);
            return Ok(FlushOutcome::NothingStaged);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Flush already in flight");
            self.emit_skipped(FlushSkipReason::AlreadyInFlight);
            return Ok(FlushOutcome::AlreadyInFlight);
        }
        let _token = FlushGuard {
            flag: &self.in_flight,
        };

        let owner_id = self.sessions.current_owner().await.ok_or(FlushError::Auth)?;
        // Entitlement is settled before any image payload is read
        self.pipeline
            .gate()
            .require_entitlement(&owner_id)
            .await
            .map_err(FlushError::PaymentRequired)?;

        let capture = {
            let _writer = self.writer.lock().await;
            self.with_staging(|staging| Ok(staging.load())).await?
        };
        let Some(capture) = capture else {
            self.emit_skipped(FlushSkipReason::NothingStaged);
            return Ok(FlushOutcome::NothingStaged);
        };

        info!(owner_id = %owner_id, "Flushing staged capture");
        self.event_bus.emit_lossy(IngestEvent::FlushStarted {
            owner_id: owner_id.clone(),
            timestamp: Utc::now(),
        });

        let record = self.pipeline.ingest(&capture, &owner_id).await?;

        let _writer = self.writer.lock().await;
        match self.with_staging(|staging| staging.clear()).await {
            Ok(()) => self.event_bus.emit_lossy(IngestEvent::StagingCleared {
                reason: "flushed".to_string(),
                timestamp: Utc::now(),
            }),
            // The scan is committed; reporting failure here would invite a
            // duplicate ingestion.
            Err(e) => error!(scan_id = %record.id, "Failed to clear staging after commit: {}", e),
        }

        Ok(FlushOutcome::Completed(record))
    }

    /// Stage a guest capture. `Ok(false)` when the capture is incomplete.
    pub async fn stage(&self, capture: &GuestCapture) -> Result<bool, FlushError> {
        let _writer = self.lock_writer().await?;
        let owned = capture.clone();
        let staged = self.with_staging(move |staging| staging.save(&owned)).await?;
        if staged {
            self.event_bus.emit_lossy(IngestEvent::CaptureStaged {
                captured_at: capture.created_at,
                timestamp: Utc::now(),
            });
        }
        Ok(staged)
    }

    /// Discard the staged capture
    pub async fn reset(&self) -> Result<(), FlushError> {
        let _writer = self.lock_writer().await?;
        self.with_staging(|staging| staging.clear()).await?;
        info!("Staging reset");
        self.event_bus.emit_lossy(IngestEvent::StagingCleared {
            reason: "reset".to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn lock_writer(&self) -> Result<tokio::sync::MutexGuard<'_, ()>, FlushError> {
        if self.is_in_flight() {
            return Err(FlushError::FlushInProgress);
        }
        let writer = self.writer.lock().await;
        // A flush may have taken the token while this call waited
        if self.is_in_flight() {
            return Err(FlushError::FlushInProgress);
        }
        Ok(writer)
    }

    /// Run a staging operation on the blocking pool
    async fn with_staging<T, F>(&self, op: F) -> Result<T, StagingError>
    where
        F: FnOnce(StagingStore) -> Result<T, StagingError> + Send + 'static,
        T: Send + 'static,
    {
        let staging = self.staging.clone();
        tokio::task::spawn_blocking(move || op(staging))
            .await
            .map_err(|e| StagingError::Task(e.to_string()))?
    }

    fn emit_skipped(&self, reason: FlushSkipReason) {
        self.event_bus.emit_lossy(IngestEvent::FlushSkipped {
            reason,
            timestamp: Utc::now(),
        });
    }
}

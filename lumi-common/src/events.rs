//! Event types for the Lumi event system
//!
//! Provides the shared ingest event definitions and the EventBus used to
//! broadcast them (and forward them to SSE clients).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Steps of one ingestion run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestStep {
    /// Entitlement check, before any I/O
    Gate,
    /// Both images written to object storage
    Upload,
    /// Short-lived read references issued for the analysis call
    AccessIssuance,
    /// External analysis service call and response validation
    Analysis,
    /// Raw scores mapped to a ScoreVector
    Normalize,
    /// ScanRecord insert (commit point)
    Persist,
    /// Best-effort downstream plan generation
    DerivePlan,
}

impl IngestStep {
    pub const ALL: [IngestStep; 7] = [
        IngestStep::Gate,
        IngestStep::Upload,
        IngestStep::AccessIssuance,
        IngestStep::Analysis,
        IngestStep::Normalize,
        IngestStep::Persist,
        IngestStep::DerivePlan,
    ];

    /// Failure of this step aborts the run
    pub fn is_fatal(self) -> bool {
        !matches!(self, IngestStep::DerivePlan)
    }
}

impl std::fmt::Display for IngestStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IngestStep::Gate => "gate",
            IngestStep::Upload => "upload",
            IngestStep::AccessIssuance => "access_issuance",
            IngestStep::Analysis => "analysis",
            IngestStep::Normalize => "normalize",
            IngestStep::Persist => "persist",
            IngestStep::DerivePlan => "derive_plan",
        };
        f.write_str(name)
    }
}

/// Why a flush request did not start a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushSkipReason {
    /// No complete capture in staging
    NothingStaged,
    /// Another flush holds the token
    AlreadyInFlight,
}

/// Lumi event types
///
/// Broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IngestEvent {
    /// A guest capture was written to staging
    CaptureStaged {
        captured_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// Staging was emptied (successful flush or explicit reset)
    StagingCleared {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A flush acquired the token and is starting the pipeline
    FlushStarted {
        owner_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A flush request returned without running the pipeline
    FlushSkipped {
        reason: FlushSkipReason,
        timestamp: DateTime<Utc>,
    },

    /// Pipeline step started
    StepStarted {
        scan_id: Option<Uuid>,
        step: IngestStep,
        timestamp: DateTime<Utc>,
    },

    /// Pipeline step finished successfully
    StepCompleted {
        scan_id: Option<Uuid>,
        step: IngestStep,
        timestamp: DateTime<Utc>,
    },

    /// Pipeline step failed
    StepFailed {
        scan_id: Option<Uuid>,
        step: IngestStep,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// ScanRecord persisted
    ScanCommitted {
        scan_id: Uuid,
        owner_id: String,
        overall: u8,
        timestamp: DateTime<Utc>,
    },
}

impl IngestEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            IngestEvent::CaptureStaged { .. } => "CaptureStaged",
            IngestEvent::StagingCleared { .. } => "StagingCleared",
            IngestEvent::FlushStarted { .. } => "FlushStarted",
            IngestEvent::FlushSkipped { .. } => "FlushSkipped",
            IngestEvent::StepStarted { .. } => "StepStarted",
            IngestEvent::StepCompleted { .. } => "StepCompleted",
            IngestEvent::StepFailed { .. } => "StepFailed",
            IngestEvent::ScanCommitted { .. } => "ScanCommitted",
        }
    }
}

/// Broadcast channel for [`IngestEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IngestEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before slow receivers
    /// start losing old events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<IngestEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: IngestEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers (SSE clients and in-process listeners)
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

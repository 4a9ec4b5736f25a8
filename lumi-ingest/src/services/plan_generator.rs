//! Downstream plan generation
//!
//! Runs after a scan is committed. Callers treat every error as non-fatal.

use crate::models::ScanRecord;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanGenerationError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Plan API error {0}: {1}")]
    ApiError(u16, String),
}

#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate(&self, record: &ScanRecord) -> Result<(), PlanGenerationError>;
}

/// POSTs the committed scan to a plan service
pub struct HttpPlanGenerator {
    http_client: reqwest::Client,
    url: String,
}

impl HttpPlanGenerator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PlanGenerationError> {
        let http_client = reqwest::Client::builder()
            .user_agent(super::USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| PlanGenerationError::NetworkError(e.to_string()))?;
        Ok(Self {
            http_client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PlanGenerator for HttpPlanGenerator {
    async fn generate(&self, record: &ScanRecord) -> Result<(), PlanGenerationError> {
        let body = json!({
            "scan_id": record.id,
            "owner_id": record.owner_id,
            "classification": record.classification,
            "score_vector": record.score_vector,
        });

        let response = self
            .http_client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlanGenerationError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PlanGenerationError::ApiError(status.as_u16(), error_text));
        }
        Ok(())
    }
}

/// No plan service configured
pub struct DisabledPlanGenerator;

#[async_trait]
impl PlanGenerator for DisabledPlanGenerator {
    async fn generate(&self, record: &ScanRecord) -> Result<(), PlanGenerationError> {
        tracing::debug!(scan_id = %record.id, "Plan generation not configured, skipping");
        Ok(())
    }
}

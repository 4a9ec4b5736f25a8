//! Entitlement gate
//!
//! The only authority on whether an owner may run an ingestion. Every
//! failure mode of the underlying source resolves to [`PaymentRequired`];
//! nothing here ever grants access by default.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Reason an owner was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentRequired {
    #[error("No signed-in owner")]
    NoSession,

    #[error("Owner is not entitled")]
    NotEntitled,

    #[error("Entitlement answer was ambiguous")]
    Ambiguous,

    #[error("Entitlement source failed: {0}")]
    SourceError(String),

    #[error("Entitlement check timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum EntitlementSourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Entitlement API error {0}: {1}")]
    Api(u16, String),
}

/// Backend answering "is this owner entitled?"
///
/// `Ok(None)` means the source answered but not with a clear yes or no.
#[async_trait]
pub trait EntitlementSource: Send + Sync {
    async fn is_entitled(&self, owner_id: &str) -> Result<Option<bool>, EntitlementSourceError>;
}

#[derive(Clone)]
pub struct EntitlementGate {
    source: Arc<dyn EntitlementSource>,
    timeout: Duration,
}

impl EntitlementGate {
    pub fn new(source: Arc<dyn EntitlementSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// `Ok(())` only on an explicit, timely "entitled" answer
    pub async fn require_entitlement(&self, owner_id: &str) -> Result<(), PaymentRequired> {
        if owner_id.trim().is_empty() {
            return Err(PaymentRequired::NoSession);
        }

        let result = match tokio::time::timeout(self.timeout, self.source.is_entitled(owner_id)).await
        {
            Err(_) => Err(PaymentRequired::Timeout(self.timeout)),
            Ok(Err(e)) => Err(PaymentRequired::SourceError(e.to_string())),
            Ok(Ok(None)) => Err(PaymentRequired::Ambiguous),
            Ok(Ok(Some(false))) => Err(PaymentRequired::NotEntitled),
            Ok(Ok(Some(true))) => Ok(()),
        };

        match &result {
            Ok(()) => debug!(owner_id = %owner_id, "Entitlement confirmed"),
            Err(PaymentRequired::NotEntitled) => {
                debug!(owner_id = %owner_id, "Owner not entitled")
            }
            Err(reason) => warn!(owner_id = %owner_id, reason = %reason, "Entitlement check failed closed"),
        }
        result
    }

    /// Entitlement as an access fact. `None` when the source could not answer.
    pub async fn lookup(&self, owner_id: &str) -> Option<bool> {
        match self.require_entitlement(owner_id).await {
            Ok(()) => Some(true),
            Err(PaymentRequired::NotEntitled) => Some(false),
            Err(_) => None,
        }
    }
}

/// Interpret an entitlement response body.
///
/// Only a JSON object with a boolean `entitled` field is an answer.
pub fn parse_entitlement_body(body: &str) -> Option<bool> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("entitled")?
        .as_bool()
}

/// Queries `GET {url}?owner_id=...`
pub struct HttpEntitlementSource {
    http_client: reqwest::Client,
    url: String,
}

impl HttpEntitlementSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, EntitlementSourceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(super::USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| EntitlementSourceError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl EntitlementSource for HttpEntitlementSource {
    async fn is_entitled(&self, owner_id: &str) -> Result<Option<bool>, EntitlementSourceError> {
        let response = self
            .http_client
            .get(&self.url)
            .query(&[("owner_id", owner_id)])
            .send()
            .await
            .map_err(|e| EntitlementSourceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EntitlementSourceError::Api(status.as_u16(), error_text));
        }

        let body = response
            .text()
            .await
            .map_err(|e| EntitlementSourceError::Network(e.to_string()))?;
        Ok(parse_entitlement_body(&body))
    }
}

/// Fixed answer for every owner (local development)
pub struct FixedEntitlementSource {
    entitled: bool,
}

impl FixedEntitlementSource {
    pub fn new(entitled: bool) -> Self {
        Self { entitled }
    }
}

#[async_trait]
impl EntitlementSource for FixedEntitlementSource {
    async fn is_entitled(&self, _owner_id: &str) -> Result<Option<bool>, EntitlementSourceError> {
        Ok(Some(self.entitled))
    }
}

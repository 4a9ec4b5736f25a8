//! External analysis service client
//!
//! Request: two image URLs plus `{ age, sex }`.
//! Response: `{ classification, scores, notes }`, validated here before any
//! score reaches the normalizer.

use crate::models::Classification;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Analysis API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Invalid analysis API key")]
    InvalidApiKey,

    #[error("Invalid analysis response: {0}")]
    InvalidResponse(String),

    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error("Analysis service not configured")]
    NotConfigured,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRequest {
    pub front_image_url: String,
    pub side_image_url: String,
    pub age: u32,
    pub sex: String,
}

/// Validated analysis response
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResponse {
    pub classification: Classification,
    /// Raw score map, aspect names as the service spells them
    pub scores: Map<String, Value>,
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawAnalysisResponse {
    classification: Option<Value>,
    scores: Option<Value>,
    #[serde(default)]
    notes: Option<Value>,
}

/// Check a response body against the fixed schema.
///
/// `classification` must be "male" or "female", `scores` must be an object
/// and `notes`, when present, a string-to-string map. Aspect completeness is
/// left to the normalizer.
pub fn validate_response(body: Value) -> Result<AnalysisResponse, AnalysisError> {
    let raw: RawAnalysisResponse = serde_json::from_value(body)
        .map_err(|e| AnalysisError::InvalidResponse(format!("not an object: {}", e)))?;

    let classification = match raw.classification {
        Some(Value::String(s)) => Classification::parse(&s).ok_or_else(|| {
            AnalysisError::InvalidResponse(format!("unknown classification '{}'", s))
        })?,
        Some(other) => {
            return Err(AnalysisError::InvalidResponse(format!(
                "classification is not a string: {}",
                other
            )))
        }
        None => {
            return Err(AnalysisError::InvalidResponse(
                "missing classification".to_string(),
            ))
        }
    };

    let scores = match raw.scores {
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(AnalysisError::InvalidResponse(
                "scores is not an object".to_string(),
            ))
        }
        None => return Err(AnalysisError::InvalidResponse("missing scores".to_string())),
    };

    let notes = match raw.notes {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(map)) => map
            .into_iter()
            .map(|(key, value)| match value {
                Value::String(s) => Ok((key, s)),
                other => Err(AnalysisError::InvalidResponse(format!(
                    "note '{}' is not a string: {}",
                    key, other
                ))),
            })
            .collect::<Result<_, _>>()?,
        Some(_) => {
            return Err(AnalysisError::InvalidResponse(
                "notes is not an object".to_string(),
            ))
        }
    };

    Ok(AnalysisResponse {
        classification,
        scores,
        notes,
    })
}

#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError>;
}

pub struct HttpAnalysisClient {
    http_client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpAnalysisClient {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let http_client = reqwest::Client::builder()
            .user_agent(super::USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisClient {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        tracing::debug!(age = request.age, sex = %request.sex, "Requesting analysis");

        let mut builder = self.http_client.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AnalysisError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AnalysisError::InvalidApiKey);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::ApiError(status.as_u16(), error_text));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;

        let validated = validate_response(body)?;
        tracing::info!(
            classification = validated.classification.as_str(),
            score_keys = validated.scores.len(),
            "Analysis response received"
        );
        Ok(validated)
    }
}

/// Stand-in when no analysis URL is configured; every call fails
pub struct UnconfiguredAnalysisService;

#[async_trait]
impl AnalysisService for UnconfiguredAnalysisService {
    async fn analyze(&self, _request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        Err(AnalysisError::NotConfigured)
    }
}

//! Error types for lumi-ingest HTTP handlers

use crate::services::{PaymentRequired, StorageError};
use crate::staging::StagingError;
use crate::workflow::FlushError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// 404
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// 400
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// 401 - no signed-in owner
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 402 - entitlement refused or undecidable
    #[error("Payment required: {0}")]
    PaymentRequired(String),

    /// 403
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// 409 - e.g. staging write while a flush runs
    #[error("Conflict: {0}")]
    Conflict(String),

    /// 502 - a pipeline step against an external service failed
    #[error("Upstream failure: {0}")]
    BadGateway(String),

    /// 507 - staging quota exhausted
    #[error("Insufficient storage: {0}")]
    InsufficientStorage(String),

    /// 500
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Common error: {0}")]
    Common(#[from] lumi_common::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::PaymentRequired(_) => (StatusCode::PAYMENT_REQUIRED, "PAYMENT_REQUIRED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "PIPELINE_STEP_FAILED"),
            ApiError::InsufficientStorage(_) => {
                (StatusCode::INSUFFICIENT_STORAGE, "STAGING_CAPACITY")
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Common(_) => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();
        if status.is_server_error() {
            tracing::error!(code = error_code, "{}", self);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<StagingError> for ApiError {
    fn from(e: StagingError) -> Self {
        match e {
            StagingError::CapacityExceeded(_) => ApiError::InsufficientStorage(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<PaymentRequired> for ApiError {
    fn from(e: PaymentRequired) -> Self {
        ApiError::PaymentRequired(e.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(path) => ApiError::NotFound(path),
            StorageError::Expired | StorageError::InvalidSignature => {
                ApiError::Forbidden(e.to_string())
            }
            StorageError::InvalidPath(_) => ApiError::BadRequest(e.to_string()),
            StorageError::Io(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<FlushError> for ApiError {
    fn from(e: FlushError) -> Self {
        match e {
            FlushError::Auth => ApiError::Unauthorized(e.to_string()),
            FlushError::PaymentRequired(reason) => reason.into(),
            FlushError::Ingestion(_) => ApiError::BadGateway(e.to_string()),
            FlushError::Staging(staging) => staging.into(),
            FlushError::FlushInProgress => ApiError::Conflict(e.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::IngestionError;

    #[test]
    fn test_flush_error_status_codes() {
        let cases = [
            (FlushError::Auth, StatusCode::UNAUTHORIZED),
            (
                FlushError::PaymentRequired(PaymentRequired::Ambiguous),
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                FlushError::Ingestion(IngestionError::Upload("disk".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (FlushError::FlushInProgress, StatusCode::CONFLICT),
            (
                FlushError::Staging(StagingError::CapacityExceeded("full".into())),
                StatusCode::INSUFFICIENT_STORAGE,
            ),
        ];
        for (err, status) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }

    #[test]
    fn test_signature_errors_are_forbidden() {
        let err = ApiError::from(StorageError::Expired);
        assert_eq!(err.parts().0, StatusCode::FORBIDDEN);
    }
}

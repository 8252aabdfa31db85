//! HTTP error type and JSON error body.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use safetrail_alerts::AlertError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// A failed request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed client input (400).
    #[error("{message}")]
    Validation {
        /// Client-facing reason.
        message: String,
        /// Extra context, e.g. the JSON parse error.
        details: Option<String>,
    },
    /// Unknown entity (404).
    #[error("{0}")]
    NotFound(String),
    /// Connection limit reached (503).
    #[error("{0}")]
    Unavailable(String),
    /// Unexpected failure (500). `details` is only sent when exposed.
    #[error("internal server error")]
    Internal {
        /// Cause, present only when internal errors are exposed.
        details: Option<String>,
    },
}

/// `{error, details?}` response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Reason.
    pub error: String,
    /// Extra context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    /// 400 with a message only.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    /// 500 carrying `cause` when `expose` is set.
    pub fn internal(cause: &dyn std::fmt::Display, expose: bool) -> Self {
        error!(error = %cause, "internal error");
        Self::Internal {
            details: expose.then(|| cause.to_string()),
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AlertError> for ApiError {
    fn from(e: AlertError) -> Self {
        match e {
            AlertError::NotFound(_) => Self::NotFound("Emergency alert not found".into()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::Validation {
            message: "Invalid request body".into(),
            details: Some(e.body_text()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::Validation {
            message: "Invalid query string".into(),
            details: Some(e.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Validation { message, details } => ErrorBody {
                error: message,
                details,
            },
            Self::NotFound(message) | Self::Unavailable(message) => ErrorBody {
                error: message,
                details: None,
            },
            Self::Internal { details } => ErrorBody {
                error: "Internal server error".into(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safetrail_core::AlertId;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_is_400() {
        let (status, body) = body_of(ApiError::validation("Location is required")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Location is required");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn missing_alert_is_404() {
        let err: ApiError = AlertError::NotFound(AlertId::from_raw("alert_x")).into();
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Emergency alert not found");
    }

    #[tokio::test]
    async fn internal_details_hidden_unless_exposed() {
        let (status, body) = body_of(ApiError::internal(&"disk on fire", false)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.get("details").is_none());

        let (_, body) = body_of(ApiError::internal(&"disk on fire", true)).await;
        assert_eq!(body["details"], "disk on fire");
    }
}

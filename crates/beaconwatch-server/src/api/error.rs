//! API error types and response handling.
//!
//! Every handler returns [`ApiResult`]; engine errors convert through
//! [`BeaconError::http_status_code`] so the status mapping lives in one place.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use beaconwatch_core::BeaconError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Each variant maps to one HTTP status code and renders as an
/// [`ErrorResponse`].
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    #[error("Bad Request: {message}")]
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 403 Forbidden - The platform refused the operation.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 404 Not Found - Resource does not exist.
    #[error("Not Found: {message}")]
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 409 Conflict - Not allowed in the scanner's current state.
    #[error("Conflict: {message}")]
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 422 Unprocessable Entity - Well-formed but semantically invalid.
    #[error("Unprocessable Entity: {message}")]
    Unprocessable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    #[error("Internal Error: {message}")]
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details.
        details: Option<String>,
    },

    /// 503 Service Unavailable - The radio or its backend is unavailable.
    #[error("Service Unavailable: {message}")]
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "UNKNOWN_BEHAVIOR",
    "message": "Unknown scan behavior 'turbo'. Only 'proactive' or 'aggressive' are applicable.",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "BLE_DISABLED").
    #[schema(example = "UNKNOWN_BEHAVIOR")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Unknown scan behavior 'turbo'. Only 'proactive' or 'aggressive' are applicable.")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// A 400 with the given code.
    pub fn bad_request(error_code: &str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            error_code: error_code.to_string(),
            message: message.into(),
        }
    }

    /// A 404 with the given code.
    pub fn not_found(error_code: &str, message: impl Into<String>) -> Self {
        Self::NotFound {
            error_code: error_code.to_string(),
            message: message.into(),
        }
    }

    /// The HTTP status this error renders with.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            Self::BadRequest { error_code, message }
            | Self::Forbidden { error_code, message }
            | Self::NotFound { error_code, message }
            | Self::Conflict { error_code, message }
            | Self::Unprocessable { error_code, message }
            | Self::ServiceUnavailable { error_code, message } => ErrorResponse {
                error: error_code,
                message,
                details: None,
            },
            Self::InternalError {
                error_code,
                message,
                details,
            } => {
                tracing::error!(
                    error_code = %error_code,
                    message = %message,
                    details = ?details,
                    "Internal server error"
                );
                ErrorResponse {
                    error: error_code,
                    message,
                    details: details.map(serde_json::Value::String),
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<BeaconError> for ApiError {
    fn from(err: BeaconError) -> Self {
        let error_code = err.error_code().to_string();
        let message = err.to_string();
        match err.http_status_code() {
            400 => Self::BadRequest { error_code, message },
            403 => Self::Forbidden { error_code, message },
            404 => Self::NotFound { error_code, message },
            409 => Self::Conflict { error_code, message },
            422 => Self::Unprocessable { error_code, message },
            503 => Self::ServiceUnavailable { error_code, message },
            _ => Self::InternalError {
                error_code,
                message,
                details: None,
            },
        }
    }
}

impl From<beaconwatch_core::ConfigError> for ApiError {
    fn from(err: beaconwatch_core::ConfigError) -> Self {
        Self::from(BeaconError::from(err))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::InternalError {
            error_code: "TASK_FAILED".to_string(),
            message: "Background task failed".to_string(),
            details: Some(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beacon_errors_keep_their_status() {
        let err = ApiError::from(BeaconError::UnknownBehavior("turbo".into()));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("turbo"));

        let err = ApiError::from(BeaconError::BleDisabled);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err = ApiError::from(BeaconError::PermissionDenied);
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err = ApiError::from(BeaconError::PersistenceError("disk full".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_code_is_carried() {
        match ApiError::from(BeaconError::MissingNetworkId) {
            ApiError::BadRequest { error_code, .. } => assert_eq!(error_code, "MISSING_NETWORK_ID"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "BLE_DISABLED".to_string(),
            message: "BLE is disabled".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"error\":\"BLE_DISABLED\""));
        assert!(json.contains("\"details\":null"));
    }
}

//! API Error Handling
//!
//! Structured error responses with HTTP status codes and request tracking.

use super::models::{CrashCashoutResponse, HiLoEndResponse};
use crate::errors::{ConfigurationError, ConflictError, RgsError};
use crate::games::types::GameKind;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (ROUND_NOT_FOUND, INVALID_STEP, GAME_MISCONFIGURED, ...)
    pub code: String,
    pub message: String,
    /// Recorded result for ROUND_SETTLED
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error types with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    /// Body or query could not be read
    BadRequest(String),
    /// Math model lookup miss
    NotFound(String),
    /// Failure reported by the settlement core
    Settlement(RgsError),
    InternalError(String),
}

impl ApiError {
    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn settlement(request_id: String, error: RgsError) -> Self {
        Self {
            kind: ApiErrorKind::Settlement(error),
            request_id,
        }
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(message),
            request_id,
        }
    }

    /// Status and code for this error
    pub fn status(&self) -> (StatusCode, &'static str) {
        match &self.kind {
            ApiErrorKind::BadRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_BODY"),
            ApiErrorKind::NotFound(_) => (StatusCode::NOT_FOUND, "MODEL_NOT_FOUND"),
            ApiErrorKind::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiErrorKind::Settlement(e) => {
                let status = match e {
                    RgsError::Configuration(
                        ConfigurationError::ModelNotFound(_) | ConfigurationError::ModelUnusable(_),
                    ) => StatusCode::SERVICE_UNAVAILABLE,
                    RgsError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    RgsError::Validation(_) => StatusCode::BAD_REQUEST,
                    RgsError::NotFound(_) => StatusCode::NOT_FOUND,
                    RgsError::Conflict(_) => StatusCode::CONFLICT,
                    RgsError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.code())
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::BadRequest(msg) => write!(f, "[{}] Bad Request: {}", self.request_id, msg),
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::Settlement(e) => write!(f, "[{}] {}", self.request_id, e),
            ApiErrorKind::InternalError(msg) => {
                write!(f, "[{}] Internal Error: {}", self.request_id, msg)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();

        let (message, details) = match &self.kind {
            ApiErrorKind::BadRequest(msg)
            | ApiErrorKind::NotFound(msg)
            | ApiErrorKind::InternalError(msg) => (msg.clone(), None),
            ApiErrorKind::Settlement(e) => {
                let details = match e {
                    RgsError::Conflict(ConflictError::AlreadySettled { result, .. }) => {
                        match result.game {
                            GameKind::HiLo => serde_json::to_value(HiLoEndResponse::from(result.as_ref())),
                            _ => serde_json::to_value(CrashCashoutResponse::from(result.as_ref())),
                        }
                        .ok()
                    }
                    _ => None,
                };
                // Storage internals stay in the logs
                let message = match e {
                    RgsError::Persistence(_) => "settlement could not be recorded".to_string(),
                    _ => e.to_string(),
                };
                (message, details)
            }
        };

        if status.is_server_error() {
            tracing::error!(request_id = %self.request_id, code, error = %self, "request failed");
        }

        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        });

        (status, body).into_response()
    }
}

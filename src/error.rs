//! # Error Handling
//!
//! HTTP-facing error type for the control API and how it is converted to JSON
//! responses. Domain errors (`RelayError`, `CodecError`) are defined next to
//! the code that raises them and converted here.
//!
//! ## Key Rust Concepts for Error Handling:
//!
//! ### Enums for Error Types
//! - **Variants**: Each variant is one kind of failure with its own status code
//! - **Pattern matching**: `match` maps variants to HTTP responses
//!
//! ### Traits for Error Conversion
//! - **From trait**: Lets handlers use `?` on relay, config and JSON errors
//! - **ResponseError trait**: Converts errors to HTTP responses
//! - **Display trait**: Defines how errors are formatted as strings

use crate::relay::RelayError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Error types returned by the control API.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500)
/// - **BadRequest**: Client sent invalid data (400)
/// - **Forbidden**: Request did not come from a local origin (403)
/// - **Conflict**: Operation not valid in the relay's current state (409)
/// - **Upstream**: The voice service refused or failed (502)
/// - **ConfigError**: Configuration problems (500)
/// - **ValidationError**: Data validation failed (400)
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors (encoder failures, task failures, etc.)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Cross-origin request to the local control API
    Forbidden(String),

    /// Relay is in the wrong state (not connected, already streaming, ...)
    Conflict(String),

    /// Joining or leaving the voice service failed
    Upstream(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules
    ValidationError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::Upstream(msg) => write!(f, "Voice service error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.as_str()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.as_str()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.as_str()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.as_str()),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "voice_service_error", msg.as_str()),
            AppError::ConfigError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg.as_str()),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.as_str()),
        }
    }
}

/// Converts errors into JSON HTTP responses.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "conflict",
///     "message": "not connected to a voice channel",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.parts().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = self.parts();

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Relay state errors become 409, voice service failures 502, encoder
/// problems 500.
impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::NotConnected | RelayError::AlreadyStreaming | RelayError::AlreadyConnected => {
                AppError::Conflict(err.to_string())
            }
            RelayError::SessionEstablishmentFailed(_) | RelayError::LeaveFailed(_) => {
                AppError::Upstream(err.to_string())
            }
            RelayError::Codec(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors are the client's fault.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

//! Error type system for the Kometa wizard
//!
//! This module provides:
//! - Domain error classification (profiles, generation, execution)
//! - HTTP status code mapping
//! - Structured error responses with trace IDs and field details

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use uuid::Uuid;

/// Main error type for the Kometa wizard
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    // Profile store errors
    #[error("Profile not found: {0}")]
    NotFound(String),

    #[error("A profile named '{0}' already exists")]
    DuplicateName(String),

    #[error("Invalid value for {field}: {message}")]
    Validation { field: String, message: String },

    // Generation errors
    #[error("Failed to generate configuration for profile '{profile}': {cause}")]
    Generation { profile: String, cause: String },

    // Execution errors
    #[error("Kometa is already running for profile '{0}'")]
    Busy(String),

    #[error("Execution error: {0}")]
    Execution(String),

    // Delivery errors (logged, never surfaced to third parties)
    #[error("Transport error: {0}")]
    Transport(String),

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WizardError {
    /// Shorthand for a field validation failure
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        WizardError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a generation failure
    pub fn generation(profile: impl Into<String>, cause: impl fmt::Display) -> Self {
        WizardError::Generation {
            profile: profile.into(),
            cause: cause.to_string(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            WizardError::InvalidRequest(_)
            | WizardError::Serialization(_)
            | WizardError::Validation { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            WizardError::NotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            WizardError::DuplicateName(_) | WizardError::Busy(_) => StatusCode::CONFLICT,

            // 422 Unprocessable Entity
            WizardError::Generation { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            // 500 Internal Server Error
            WizardError::Execution(_)
            | WizardError::Transport(_)
            | WizardError::Io(_)
            | WizardError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type name for API responses and hub error events
    pub fn error_type(&self) -> &'static str {
        match self {
            WizardError::NotFound(_) => "NotFoundError",
            WizardError::DuplicateName(_) => "DuplicateNameError",
            WizardError::Validation { .. } => "ValidationError",
            WizardError::Generation { .. } => "GenerationError",
            WizardError::Busy(_) => "BusyError",
            WizardError::Execution(_) => "ExecutionError",
            WizardError::Transport(_) => "TransportError",
            WizardError::InvalidRequest(_) => "InvalidRequest",
            WizardError::Io(_) => "IoError",
            WizardError::Serialization(_) => "SerializationError",
            WizardError::Config(_) => "ConfigError",
        }
    }

    /// Profile name the error refers to, when there is one
    pub fn profile(&self) -> Option<&str> {
        match self {
            WizardError::NotFound(name)
            | WizardError::DuplicateName(name)
            | WizardError::Busy(name) => Some(name),
            WizardError::Generation { profile, .. } => Some(profile),
            _ => None,
        }
    }

    /// Offending input field, for UI highlighting
    pub fn field(&self) -> Option<&str> {
        match self {
            WizardError::Validation { field, .. } => Some(field),
            WizardError::DuplicateName(_) => Some("Name"),
            _ => None,
        }
    }

    /// Structured detail payload, `None` when the error carries nothing beyond its message
    pub fn details(&self) -> Option<serde_json::Value> {
        if self.profile().is_none() && self.field().is_none() {
            return None;
        }
        Some(json!({
            "profile": self.profile(),
            "field": self.field(),
        }))
    }
}

/// Error response structure for API endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Unique trace ID for this error
    pub trace_id: String,
}

impl ErrorResponse {
    /// Create a new error response with a generated trace ID
    pub fn new(error: String, message: String) -> Self {
        Self {
            error,
            message,
            details: None,
            trace_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an error response from a WizardError, carrying its structured details
    pub fn from_error(error: &WizardError) -> Self {
        Self {
            details: error.details(),
            ..Self::new(error.error_type().to_string(), error.to_string())
        }
    }

    /// Create an error response from a WizardError with a specific trace ID
    pub fn from_error_with_trace_id(error: &WizardError, trace_id: String) -> Self {
        Self {
            trace_id,
            ..Self::from_error(error)
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} (trace_id: {})",
            self.error,
            self.message,
            self.details.as_ref().map_or("", |_| "with details"),
            self.trace_id
        )
    }
}

/// Implement IntoResponse for WizardError to enable automatic error handling in Axum
impl IntoResponse for WizardError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_response = ErrorResponse::from_error(&self);

        tracing::error!(
            error_type = self.error_type(),
            trace_id = %error_response.trace_id,
            status_code = %status_code,
            "Request failed: {}",
            self
        );

        (status_code, Json(error_response)).into_response()
    }
}

impl From<serde_json::Error> for WizardError {
    fn from(err: serde_json::Error) -> Self {
        WizardError::Serialization(err.to_string())
    }
}

/// Result type alias for operations that can fail with WizardError
pub type Result<T> = std::result::Result<T, WizardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            WizardError::InvalidRequest("test".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WizardError::validation("Plex.Token", "required").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WizardError::NotFound("test".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            WizardError::DuplicateName("test".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            WizardError::Busy("test".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            WizardError::generation("test", "boom").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_error_types() {
        assert_eq!(
            WizardError::DuplicateName("test".into()).error_type(),
            "DuplicateNameError"
        );
        assert_eq!(
            WizardError::validation("Plex.Url", "required").error_type(),
            "ValidationError"
        );
        assert_eq!(WizardError::Busy("x".into()).error_type(), "BusyError");
    }

    #[test]
    fn test_error_response_carries_field() {
        let error = WizardError::validation("Plex.Token", "a Plex token is required");
        let response = ErrorResponse::from_error(&error);

        assert_eq!(response.error, "ValidationError");
        assert!(response.message.contains("Plex.Token"));
        let details = response.details.unwrap();
        assert_eq!(details["field"], "Plex.Token");
        assert!(details["profile"].is_null());
    }

    #[test]
    fn test_error_response_carries_profile() {
        let error = WizardError::generation("Movies", "bad service block");
        let response = ErrorResponse::from_error(&error);

        assert_eq!(response.error, "GenerationError");
        assert_eq!(response.details.unwrap()["profile"], "Movies");
        assert!(!response.trace_id.is_empty());
    }

    #[test]
    fn test_error_response_with_trace_id() {
        let error = WizardError::NotFound("Foo".into());
        let trace_id = "test-trace-id-123".to_string();
        let response = ErrorResponse::from_error_with_trace_id(&error, trace_id.clone());

        assert_eq!(response.error, "NotFoundError");
        assert_eq!(response.trace_id, trace_id);
    }

    #[test]
    fn test_plain_errors_have_no_details() {
        let error = WizardError::Execution("spawn failed".into());
        assert!(ErrorResponse::from_error(&error).details.is_none());
    }
}

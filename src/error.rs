//! # Error Handling
//!
//! Two error layers live here:
//!
//! - [`ExchangeError`] is the protocol-side taxonomy. Every failure mode of a
//!   media-exchange transaction maps onto one of its variants, and the variant
//!   decides how the coordinator reacts (abort before processing, degrade,
//!   abort after partial commitment, or go silent).
//! - [`AppError`] is the HTTP-side error type for the REST endpoints, converted
//!   into JSON error responses via actix's `ResponseError`.
//!
//! No failure in either layer is fatal to the process: a broken transaction
//! never takes down the listener.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Which collaborator stage of the processing sequence failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    Transcription,
    Generation,
    Synthesis,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Transcription => "transcription",
            ProcessingStage::Generation => "generation",
            ProcessingStage::Synthesis => "synthesis",
        }
    }
}

/// Failure taxonomy for one media-exchange transaction.
///
/// ## Propagation policy:
/// - `Protocol` / `Transfer`: abort before any collaborator is invoked,
///   reported to the client as a structured error frame.
/// - `Storage`: aborts for the required audio artifact; the optional image
///   artifact degrades to audio-only instead.
/// - `Processing`: aborts after files are already saved, reported with the
///   stage that failed.
/// - `Transmit`: the connection is assumed unusable — logged, no further
///   client-visible message.
///
/// No automatic retries anywhere; a client retries across a fresh connection.
#[derive(Debug)]
pub enum ExchangeError {
    /// Malformed metadata or declared sizes out of bounds.
    Protocol(String),

    /// Timeout with insufficient partial data, or an empty required stream.
    Transfer(String),

    /// Artifact write or post-write verification failure.
    Storage(String),

    /// A processing collaborator failed.
    Processing {
        stage: ProcessingStage,
        message: String,
    },

    /// Failure sending the response head or chunks back to the client.
    Transmit(String),
}

impl ExchangeError {
    pub fn transcription(message: impl Into<String>) -> Self {
        ExchangeError::Processing {
            stage: ProcessingStage::Transcription,
            message: message.into(),
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        ExchangeError::Processing {
            stage: ProcessingStage::Generation,
            message: message.into(),
        }
    }

    pub fn synthesis(message: impl Into<String>) -> Self {
        ExchangeError::Processing {
            stage: ProcessingStage::Synthesis,
            message: message.into(),
        }
    }

    /// Message placed in the error frame sent to the client.
    pub fn client_message(&self) -> String {
        match self {
            ExchangeError::Protocol(msg) | ExchangeError::Transfer(msg) => msg.clone(),
            ExchangeError::Storage(msg) => format!("Storage error: {}", msg),
            ExchangeError::Processing { stage, message } => {
                format!("Processing error ({}): {}", stage.as_str(), message)
            }
            ExchangeError::Transmit(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            ExchangeError::Transfer(msg) => write!(f, "transfer error: {}", msg),
            ExchangeError::Storage(msg) => write!(f, "storage error: {}", msg),
            ExchangeError::Processing { stage, message } => {
                write!(f, "processing error in {}: {}", stage.as_str(), message)
            }
            ExchangeError::Transmit(msg) => write!(f, "transmit error: {}", msg),
        }
    }
}

impl std::error::Error for ExchangeError {}

/// Custom error types for the HTTP surface.
///
/// ## Error Categories:
/// - **Internal**: server-side problems (500)
/// - **BadRequest**: client sent invalid data (400)
/// - **NotFound**: requested resource doesn't exist (404)
/// - **ConfigError**: configuration problems (500)
/// - **ValidationError**: data validation failed (400)
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    NotFound(String),
    ConfigError(String),
    ValidationError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            AppError::ValidationError(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

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

impl From<ExchangeError> for AppError {
    fn from(err: ExchangeError) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Shorthand for Results carried through the HTTP handlers.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_error_names_stage() {
        let err = ExchangeError::generation("upstream returned 503");
        assert_eq!(
            err.to_string(),
            "processing error in generation: upstream returned 503"
        );
        assert!(err.client_message().contains("generation"));
    }

    #[test]
    fn test_protocol_client_message_is_bare() {
        let err = ExchangeError::Protocol("Invalid metadata format".to_string());
        assert_eq!(err.client_message(), "Invalid metadata format");
    }
}

//! # Error Handling
//!
//! This module defines the HTTP-facing error type and how it's converted to
//! responses. Domain modules have their own error enums (`TurnError`,
//! `LifecycleError`, ...); they are mapped into [`AppError`] at the handler
//! boundary.
//!
//! ## Key Rust Concepts for Error Handling:
//!
//! ### thiserror
//! - **Purpose**: derives `Display` and `std::error::Error` from attributes
//! - **#[error("...")]**: the message used by `Display`
//!
//! ### Traits for Error Conversion
//! - **From trait**: lets `?` convert domain errors automatically
//! - **ResponseError trait**: converts errors to HTTP responses
//!
//! ## What clients see:
//! Every error becomes `{"message": "..."}` with a fixed, human-readable
//! message. The detailed cause is logged here and never echoed back.

use crate::handlers::response::ApiResponse;
use crate::pipeline::TurnError;
use crate::session::LifecycleError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Errors returned by HTTP handlers.
///
/// ## Status Mapping:
/// - **Unauthenticated / InvalidCredential** → 401
/// - **BadRequest / EmptyTranscript** → 400
/// - **SessionNotFound** → 404
/// - **Conflict** → 409 (safe to retry the request)
/// - **PayloadTooLarge** → 413
/// - **Upstream** → 502 (speech or language provider failed)
/// - **AssetUnavailable** → 503
/// - **Internal** → 500
#[derive(Debug, Error)]
pub enum AppError {
    /// Credential header missing or malformed
    #[error("missing or malformed credential")]
    Unauthenticated,

    /// Well-formed credential that does not match the session
    #[error("invalid credential")]
    InvalidCredential,

    #[error("session not found")]
    SessionNotFound,

    /// Client sent something unusable; the message is shown as-is
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Uploaded answer exceeds the configured size limit
    #[error("upload too large")]
    PayloadTooLarge,

    #[error("audio transcription was empty")]
    EmptyTranscript,

    /// A provider call failed; the message names the failed step
    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("greeting assets unavailable")]
    AssetUnavailable,

    /// Another turn updated the session first
    #[error("session updated concurrently")]
    Conflict,

    /// Anything else; the detail is only logged
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Message shown to the client.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Unauthenticated => "missing or malformed credential".to_string(),
            AppError::InvalidCredential => "invalid credential".to_string(),
            AppError::SessionNotFound => "session not found".to_string(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::PayloadTooLarge => "file too large".to_string(),
            AppError::EmptyTranscript => "cannot complete audio transcription".to_string(),
            AppError::Upstream(msg) => msg.clone(),
            AppError::AssetUnavailable => "failed to get initial chat".to_string(),
            AppError::Conflict => "session was updated by another request, please retry".to_string(),
            AppError::Internal(_) => "an error occurred while processing the request".to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated | AppError::InvalidCredential => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) | AppError::EmptyTranscript => StatusCode::BAD_REQUEST,
            AppError::SessionNotFound => StatusCode::NOT_FOUND,
            AppError::Conflict => StatusCode::CONFLICT,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::AssetUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiResponse::failure(self.public_message()))
    }
}

/// Map a failed turn onto the HTTP taxonomy, logging the cause.
impl From<TurnError> for AppError {
    fn from(err: TurnError) -> Self {
        match &err {
            TurnError::SessionNotFound(_)
            | TurnError::InvalidCredential(_)
            | TurnError::InvalidInput(_)
            | TurnError::EmptyTranscript
            | TurnError::PersistenceConflict(_) => tracing::info!(error = %err, "Turn rejected"),
            _ => tracing::error!(error = %err, "Turn failed"),
        }

        match err {
            TurnError::SessionNotFound(_) => AppError::SessionNotFound,
            TurnError::InvalidCredential(_) => AppError::InvalidCredential,
            TurnError::InvalidInput(msg) => AppError::BadRequest(msg),
            TurnError::EmptyTranscript => AppError::EmptyTranscript,
            TurnError::TranscriptionFailed(_) => AppError::Upstream("failed to transcribe audio".to_string()),
            TurnError::CompletionFailed(_) => AppError::Upstream("failed to get chat completion".to_string()),
            TurnError::NoCompletion => AppError::Upstream("cannot complete chat completion".to_string()),
            TurnError::SynthesisFailed(_) => AppError::Upstream("failed to create speech".to_string()),
            TurnError::PersistenceConflict(_) => AppError::Conflict,
            err @ (TurnError::CorruptedSession { .. } | TurnError::Persistence(_)) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        tracing::error!(error = %err, "Failed to start session");
        match err {
            LifecycleError::AssetUnavailable(_) => AppError::AssetUnavailable,
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<actix_multipart::MultipartError> for AppError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        tracing::info!(error = %err, "Unreadable multipart body");
        AppError::BadRequest("failed to read file".to_string())
    }
}

/// Shorthand for handler results.
pub type AppResult<T> = Result<T, AppError>;

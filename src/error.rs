//! Service error taxonomy and its HTTP mapping.
//!
//! Expected outcomes (not found, duplicates, conflicts, rate limiting,
//! timeouts) reach the client verbatim. Internal causes are logged here and
//! collapsed to a generic message before leaving the process.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Errors surfaced by the request pipeline and the account handlers.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed or policy-violating input.
    #[error("{0}")]
    Validation(String),

    #[error("missing required header: User-Agent")]
    MissingUserAgent,

    #[error("request body exceeds max size")]
    PayloadTooLarge,

    #[error("method not allowed")]
    MethodNotAllowed,

    /// The content scanner matched a disallowed pattern.
    #[error("request contains invalid characters")]
    InvalidContent,

    #[error("{0}")]
    Unauthorized(String),

    #[error("user not found")]
    NotFound,

    /// Uniqueness violation; carries the offending field.
    #[error("{0} already exists")]
    DuplicateEntry(&'static str),

    /// Optimistic-lock loss; the caller must retry the whole operation.
    #[error("record was modified concurrently, retry the operation")]
    Conflict,

    #[error("too many requests")]
    RateLimited,

    #[error("service unavailable")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) | ServiceError::MissingUserAgent => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ServiceError::DuplicateEntry(_) | ServiceError::Conflict => StatusCode::CONFLICT,
            ServiceError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::InvalidContent => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Application error code returned in the JSON body.
    pub fn code(&self) -> u32 {
        match self {
            ServiceError::Validation(_) => 400_000,
            ServiceError::MissingUserAgent => 400_001,
            ServiceError::Unauthorized(_) => 401_000,
            ServiceError::NotFound => 404_000,
            ServiceError::MethodNotAllowed => 405_001,
            ServiceError::DuplicateEntry(_) => 409_001,
            ServiceError::Conflict => 409_002,
            ServiceError::PayloadTooLarge => 413_001,
            ServiceError::InvalidContent => 422_001,
            ServiceError::RateLimited => 429_001,
            ServiceError::Timeout => 503_000,
            ServiceError::Internal(_) => 500_000,
        }
    }

    /// Message safe to show a client.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u32,
    pub message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        if let ServiceError::Internal(cause) = &self {
            tracing::error!(cause = %cause, "Internal error");
        }

        let body = ErrorBody {
            code: self.code(),
            message: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServiceError::NotFound,
            StoreError::DuplicateEntry(field) => ServiceError::DuplicateEntry(field),
            StoreError::Conflict => ServiceError::Conflict,
            StoreError::Database(e) => ServiceError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken(_) | AuthError::MissingToken => {
                ServiceError::Unauthorized(err.to_string())
            }
            AuthError::Hash(cause) | AuthError::Sign(cause) | AuthError::TaskFailed(cause) => {
                ServiceError::Internal(cause)
            }
        }
    }
}

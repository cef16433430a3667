//! Request pipeline composer.
//!
//! # Data Flow
//! ```text
//! request parameters + business handler
//!     → deadline guard spawns a worker task
//!         → scanner (422 on match)
//!         → limiter (429 when no permit)
//!         → handler
//!     → worker outcome races the deadline (503 on timeout)
//!     → PipelineOutcome
//! ```
//!
//! # Design Decisions
//! - Scanner, limiter and handler run strictly in that order per request
//! - The pipeline is transport-agnostic; `middleware.rs` adapts it to axum
//! - A panic in the handler is re-raised to the caller, not classified here

pub mod middleware;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::{ErrorBody, ServiceError};
use crate::observability::metrics;
use crate::resilience::deadline::{self, DeadlineError, DeadlineSignal};
use crate::security::rate_limit::TokenBucketLimiter;
use crate::security::scanner::ContentScanner;

pub use middleware::pipeline_middleware;

/// Result of one request through the pipeline.
#[derive(Debug)]
pub enum PipelineOutcome<T> {
    Success(T),
    ClientError {
        status: StatusCode,
        code: u32,
        message: String,
    },
    Conflict,
    Timeout,
    RateLimited,
    InternalError,
}

impl<T> From<ServiceError> for PipelineOutcome<T> {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Conflict => PipelineOutcome::Conflict,
            ServiceError::RateLimited => PipelineOutcome::RateLimited,
            ServiceError::Timeout => PipelineOutcome::Timeout,
            ServiceError::Internal(cause) => {
                tracing::error!(cause = %cause, "Internal error in pipeline");
                PipelineOutcome::InternalError
            }
            other => PipelineOutcome::ClientError {
                status: other.status(),
                code: other.code(),
                message: other.public_message(),
            },
        }
    }
}

impl<T: IntoResponse> IntoResponse for PipelineOutcome<T> {
    fn into_response(self) -> Response {
        match self {
            PipelineOutcome::Success(body) => body.into_response(),
            PipelineOutcome::ClientError { status, code, message } => {
                (status, Json(ErrorBody { code, message })).into_response()
            }
            PipelineOutcome::Conflict => ServiceError::Conflict.into_response(),
            PipelineOutcome::Timeout => ServiceError::Timeout.into_response(),
            PipelineOutcome::RateLimited => ServiceError::RateLimited.into_response(),
            PipelineOutcome::InternalError => {
                let err = ServiceError::Internal(String::new());
                (err.status(), Json(ErrorBody { code: err.code(), message: err.public_message() }))
                    .into_response()
            }
        }
    }
}

/// Deadline guard around scanner → limiter → handler.
pub struct Pipeline {
    scanner: Arc<ContentScanner>,
    limiter: Option<Arc<TokenBucketLimiter>>,
    deadline: Duration,
    max_form_bytes: usize,
}

impl Pipeline {
    /// `limiter` is `None` when rate limiting is disabled.
    pub fn new(
        scanner: ContentScanner,
        limiter: Option<Arc<TokenBucketLimiter>>,
        deadline: Duration,
        max_form_bytes: usize,
    ) -> Self {
        Self {
            scanner: Arc::new(scanner),
            limiter,
            deadline,
            max_form_bytes,
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn max_form_bytes(&self) -> usize {
        self.max_form_bytes
    }

    /// Run one request's parameters and handler through the chain.
    pub async fn process<T, F, Fut>(&self, params: Vec<(String, String)>, handler: F) -> PipelineOutcome<T>
    where
        F: FnOnce(DeadlineSignal) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ServiceError>> + Send + 'static,
        T: Send + 'static,
    {
        let scanner = self.scanner.clone();
        let limiter = self.limiter.clone();

        let guarded = deadline::run(self.deadline, move |signal| async move {
            if scanner.scan(&params) {
                tracing::warn!(params = params.len(), "Request parameters matched a disallowed pattern");
                metrics::record_content_violation();
                return Err(ServiceError::InvalidContent);
            }

            if let Some(limiter) = &limiter {
                if !limiter.try_acquire() {
                    tracing::info!("Rate limit exceeded");
                    metrics::record_rate_limited();
                    return Err(ServiceError::RateLimited);
                }
            }

            handler(signal).await
        })
        .await;

        match guarded {
            Ok(Ok(value)) => PipelineOutcome::Success(value),
            Ok(Err(err)) => err.into(),
            Err(DeadlineError::Elapsed(after)) => {
                tracing::warn!(deadline = ?after, "Request timed out");
                metrics::record_timeout();
                PipelineOutcome::Timeout
            }
            Err(DeadlineError::WorkerLost) => {
                tracing::error!("Pipeline worker ended without a result");
                PipelineOutcome::InternalError
            }
        }
    }
}

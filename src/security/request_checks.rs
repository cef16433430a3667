//! Boundary request checks.
//!
//! Cheap header-only rejections that run before the pipeline: missing
//! User-Agent, declared body over the limit, disallowed method.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::SecurityConfig;
use crate::error::ServiceError;

#[derive(Debug, Clone)]
pub struct RequestChecks {
    require_user_agent: bool,
    max_body_size: u64,
    allowed_methods: Vec<Method>,
}

impl RequestChecks {
    pub fn from_config(config: &SecurityConfig) -> Self {
        let allowed_methods = config
            .allowed_methods
            .iter()
            .filter_map(|m| match Method::from_bytes(m.to_ascii_uppercase().as_bytes()) {
                Ok(method) => Some(method),
                Err(_) => {
                    tracing::warn!(method = %m, "Ignoring invalid method in security.allowed_methods");
                    None
                }
            })
            .collect();

        Self {
            require_user_agent: config.require_user_agent,
            max_body_size: config.max_body_size as u64,
            allowed_methods,
        }
    }

    pub fn check<B>(&self, request: &Request<B>) -> Result<(), ServiceError> {
        if self.require_user_agent {
            let has_agent = request
                .headers()
                .get(header::USER_AGENT)
                .is_some_and(|v| !v.is_empty());
            if !has_agent {
                return Err(ServiceError::MissingUserAgent);
            }
        }

        let declared_length = request
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared_length.is_some_and(|len| len > self.max_body_size) {
            return Err(ServiceError::PayloadTooLarge);
        }

        if !self.allowed_methods.contains(request.method()) {
            return Err(ServiceError::MethodNotAllowed);
        }

        Ok(())
    }
}

pub async fn request_checks_middleware(
    State(checks): State<Arc<RequestChecks>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match checks.check(&request) {
        Ok(()) => next.run(request).await,
        Err(err) => {
            tracing::warn!(
                code = err.code(),
                method = %request.method(),
                path = %request.uri().path(),
                "Security check rejected request: {}",
                err
            );
            err.into_response()
        }
    }
}

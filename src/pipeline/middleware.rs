//! Axum adapter for [`Pipeline`].

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::CONTENT_TYPE, request::Parts, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ServiceError;
use crate::pipeline::Pipeline;
use crate::resilience::deadline::DeadlineSignal;

/// Route every request below this layer through the pipeline.
///
/// The rest of the middleware stack and the handler run inside the guard's
/// worker task, with the deadline signal available as a request extension.
pub async fn pipeline_middleware(
    State(pipeline): State<Arc<Pipeline>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (params, request) = match collect_params(request, pipeline.max_form_bytes()).await {
        Ok(collected) => collected,
        Err(err) => return err.into_response(),
    };

    pipeline
        .process(params, move |signal| async move {
            let mut request = request;
            request.extensions_mut().insert(signal);
            Ok(next.run(request).await)
        })
        .await
        .into_response()
}

/// Gather query pairs and, for urlencoded bodies, form pairs.
///
/// A consumed form body is put back so the handler can still read it.
async fn collect_params(
    request: Request<Body>,
    max_form_bytes: usize,
) -> Result<(Vec<(String, String)>, Request<Body>), ServiceError> {
    let mut params: Vec<(String, String)> = request
        .uri()
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let is_form = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

    if !is_form {
        return Ok((params, request));
    }

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, max_form_bytes)
        .await
        .map_err(|_| ServiceError::PayloadTooLarge)?;
    params.extend(url::form_urlencoded::parse(&bytes).into_owned());

    Ok((params, Request::from_parts(parts, Body::from(bytes))))
}

/// Handlers take the signal as an extractor; outside a guard it never fires.
impl<S: Send + Sync> FromRequestParts<S> for DeadlineSignal {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<DeadlineSignal>()
            .cloned()
            .unwrap_or_else(DeadlineSignal::never))
    }
}

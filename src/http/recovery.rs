//! Panic-to-response conversion for the outermost layer.

use std::any::Any;

use axum::{
    body::Body,
    http::{Response, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tower_http::catch_panic::ResponseForPanic;

use crate::error::ServiceError;
use crate::resilience::deadline::panic_message;

/// Turns a recovered panic into a 500.
///
/// Development responses carry the panic message under `error`; production
/// responses never do.
#[derive(Debug, Clone, Copy)]
pub struct PanicResponder {
    expose_detail: bool,
}

impl PanicResponder {
    pub fn new(expose_detail: bool) -> Self {
        Self { expose_detail }
    }
}

impl ResponseForPanic for PanicResponder {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, err: Box<dyn Any + Send + 'static>) -> Response<Self::ResponseBody> {
        let detail = panic_message(err.as_ref());
        tracing::error!(panic = %detail, "Recovered from panic while serving request");

        let internal = ServiceError::Internal(String::new());
        let mut body = json!({
            "code": internal.code(),
            "message": internal.public_message(),
        });
        if self.expose_detail {
            body["error"] = json!(detail);
        }

        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

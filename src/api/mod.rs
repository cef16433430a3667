//! Account endpoints.
//!
//! Every route here runs behind the request pipeline; `/health` is mounted
//! separately by the server.

pub mod accounts;
pub mod dto;
pub mod health;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::{post, put};
use axum::{Json, Router};

use crate::error::ServiceError;
use crate::http::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/users/register", post(accounts::register))
        .route("/api/v1/users/login", post(accounts::login))
        .route("/api/v1/users/password", put(accounts::change_password))
}

/// Map body-extraction failures onto the service error codes.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            Err(ServiceError::PayloadTooLarge)
        }
        Err(rejection) => Err(ServiceError::Validation(rejection.body_text())),
    }
}

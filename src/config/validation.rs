//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and combinations.
//! All violations are collected, not just the first.

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{ServiceConfig, PLACEHOLDER_JWT_SECRET};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown environment '{0}'")]
    UnknownEnvironment(String),

    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("timeouts.request_ms must be greater than zero")]
    ZeroRequestTimeout,

    #[error("auth.jwt_secret must not be empty")]
    EmptyJwtSecret,

    #[error("auth.jwt_secret is the placeholder value in production")]
    PlaceholderJwtSecret,

    #[error("auth.{0} must be greater than zero")]
    ZeroHashParameter(&'static str),

    #[error("database.max_connections must be greater than zero")]
    ZeroPoolSize,
}

/// Validate a loaded configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !matches!(config.environment.as_str(), "development" | "production") {
        errors.push(ValidationError::UnknownEnvironment(config.environment.clone()));
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if config.timeouts.request_ms == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if config.auth.jwt_secret.is_empty() {
        errors.push(ValidationError::EmptyJwtSecret);
    } else if config.is_production() && config.auth.jwt_secret == PLACEHOLDER_JWT_SECRET {
        errors.push(ValidationError::PlaceholderJwtSecret);
    }

    for (name, value) in [
        ("argon2_memory_kib", config.auth.argon2_memory_kib),
        ("argon2_iterations", config.auth.argon2_iterations),
        ("argon2_parallelism", config.auth.argon2_parallelism),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroHashParameter(name));
        }
    }

    if config.database.max_connections == 0 {
        errors.push(ValidationError::ZeroPoolSize);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

//! Credential capabilities: password hashing and signed tokens.
//!
//! # Design Decisions
//! - Hashing runs on the blocking pool, never on a runtime worker
//! - The hasher sits behind a trait so handlers can be tested without argon2
//! - Token failures are Unauthorized; hash and signing failures are internal

pub mod extract;
pub mod password;
pub mod token;

use thiserror::Error;

pub use extract::AuthUser;
pub use password::{Argon2Hasher, CredentialHasher};
pub use token::{Claims, TokenIssuer};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("hash failure: {0}")]
    Hash(String),

    #[error("token signing failure: {0}")]
    Sign(String),

    #[error("blocking task failed: {0}")]
    TaskFailed(String),
}

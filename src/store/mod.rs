//! Credential store subsystem.
//!
//! # Data Flow
//! ```text
//! register:        exists checks → create_user (version = 1)
//! change password: find_active_by_id (read version v)
//!                  → hash new password, no lock held
//!                  → UPDATE ... WHERE id = ? AND version = v
//!                  → 1 row: version v + 1 | 0 rows: Conflict
//! ```
//!
//! # Design Decisions
//! - The version column is the only concurrency token; no in-process lock,
//!   since other processes may write the same rows
//! - Zero affected rows is a generic Conflict; the cause is not guessed
//! - Uniqueness violations are DuplicateEntry, never Conflict

pub mod model;
pub mod repository;

use thiserror::Error;

pub use model::UserRecord;
pub use repository::UserStore;

/// Errors from the credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found")]
    NotFound,

    #[error("{0} already exists")]
    DuplicateEntry(&'static str),

    /// Conditional write matched no row.
    #[error("conditional update affected no rows")]
    Conflict,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

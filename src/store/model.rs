//! Persisted user record.

use serde::Serialize;
use sqlx::FromRow;
use std::time::{SystemTime, UNIX_EPOCH};

/// A row of the `users` table.
///
/// `version` starts at 1 and grows by exactly one on every successful
/// mutation; it is the optimistic-concurrency token for writers.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub version: i64,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Milliseconds since the Unix epoch.
    pub updated_at: i64,
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

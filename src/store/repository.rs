//! SQLite-backed user repository.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::config::DatabaseConfig;
use crate::store::model::{now_millis, UserRecord};
use crate::store::StoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    username      TEXT    NOT NULL UNIQUE,
    email         TEXT    NOT NULL UNIQUE,
    password_hash TEXT    NOT NULL,
    is_active     BOOLEAN NOT NULL DEFAULT 1,
    version       INTEGER NOT NULL DEFAULT 1,
    created_at    INTEGER NOT NULL,
    updated_at    INTEGER NOT NULL
)
"#;

const SELECT_COLUMNS: &str =
    "SELECT id, username, email, password_hash, is_active, version, created_at, updated_at FROM users";

/// Credential store over a pooled SQLite database.
///
/// Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    /// Connect using the configured URL and pool size.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        tracing::info!(url = %config.url, max_connections = config.max_connections, "Database pool ready");
        Ok(Self { pool })
    }

    /// Private in-memory database on a single long-lived connection.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the schema if missing.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ? AND is_active = 1)",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists != 0)
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ? AND is_active = 1)",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists != 0)
    }

    /// Insert a new active user at version 1 and return its id.
    ///
    /// A uniqueness violation on username or email maps to `DuplicateEntry`.
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<i64, StoreError> {
        let now = now_millis();
        let result = sqlx::query(
            "INSERT INTO users (username, email, password_hash, is_active, version, created_at, updated_at) \
             VALUES (?, ?, ?, 1, 1, ?, ?)",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                let field = if db_err.message().contains("users.email") {
                    "email"
                } else {
                    "username"
                };
                Err(StoreError::DuplicateEntry(field))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_active_by_id(&self, id: i64) -> Result<UserRecord, StoreError> {
        sqlx::query_as::<_, UserRecord>(&format!("{SELECT_COLUMNS} WHERE id = ? AND is_active = 1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    pub async fn find_active_by_username(&self, username: &str) -> Result<UserRecord, StoreError> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "{SELECT_COLUMNS} WHERE username = ? AND is_active = 1 LIMIT 1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    /// Conditional write: replace the hash and bump the version only if the
    /// row still carries `expected_version`. Returns the new version.
    ///
    /// Zero affected rows means another writer won or the record vanished;
    /// both are reported as `Conflict`.
    pub async fn update_password_if_version(
        &self,
        id: i64,
        expected_version: i64,
        new_hash: &str,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = ?, version = version + 1, updated_at = ? \
             WHERE id = ? AND version = ? AND is_active = 1",
        )
        .bind(new_hash)
        .bind(now_millis())
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        match result.rows_affected() {
            0 => {
                tracing::warn!(user_id = id, expected_version, "Optimistic password update lost the race");
                Err(StoreError::Conflict)
            }
            _ => Ok(expected_version + 1),
        }
    }

    /// Read the active record, then write conditionally on its version.
    pub async fn update_password(&self, id: i64, new_hash: &str) -> Result<i64, StoreError> {
        let current = self.find_active_by_id(id).await?;
        self.update_password_if_version(id, current.version, new_hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> UserStore {
        let store = UserStore::in_memory().await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_create_starts_at_version_one() {
        let store = store().await;
        let id = store.create_user("alice", "alice@example.com", "h0").await.unwrap();

        let user = store.find_active_by_id(id).await.unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.version, 1);
        assert!(user.is_active);
        assert!(store.username_exists("alice").await.unwrap());
        assert!(!store.username_exists("Alice").await.unwrap());
        assert!(store.email_exists("alice@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicates_are_reported_per_field() {
        let store = store().await;
        store.create_user("alice", "alice@example.com", "h0").await.unwrap();

        let err = store.create_user("alice", "other@example.com", "h1").await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEntry("username")));

        let err = store.create_user("bob", "alice@example.com", "h1").await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEntry("email")));
    }

    #[tokio::test]
    async fn test_update_bumps_version_by_one() {
        let store = store().await;
        let id = store.create_user("alice", "alice@example.com", "h0").await.unwrap();

        assert_eq!(store.update_password(id, "h1").await.unwrap(), 2);
        assert_eq!(store.update_password(id, "h2").await.unwrap(), 3);

        let user = store.find_active_by_id(id).await.unwrap();
        assert_eq!(user.password_hash, "h2");
        assert_eq!(user.version, 3);
        assert!(user.updated_at >= user.created_at);
    }

    #[tokio::test]
    async fn test_concurrent_writers_from_same_version() {
        let store = store().await;
        let id = store.create_user("alice", "alice@example.com", "h0").await.unwrap();

        // Both writers read before either writes.
        let seen_a = store.find_active_by_id(id).await.unwrap().version;
        let seen_b = store.find_active_by_id(id).await.unwrap().version;
        assert_eq!(seen_a, seen_b);

        let (a, b) = tokio::join!(
            store.update_password_if_version(id, seen_a, "h1"),
            store.update_password_if_version(id, seen_b, "h2"),
        );

        let outcomes = [a, b];
        let wins = outcomes.iter().filter(|r| r.is_ok()).count();
        let conflicts = outcomes
            .iter()
            .filter(|r| matches!(r, Err(StoreError::Conflict)))
            .count();
        assert_eq!((wins, conflicts), (1, 1));

        let user = store.find_active_by_id(id).await.unwrap();
        assert_eq!(user.version, seen_a + 1);
    }

    #[tokio::test]
    async fn test_missing_user_is_not_found_not_conflict() {
        let store = store().await;
        let err = store.update_password(404, "h1").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_inactive_user_is_not_found() {
        let store = store().await;
        let id = store.create_user("alice", "alice@example.com", "h0").await.unwrap();
        sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(store.pool())
            .await
            .unwrap();

        assert!(matches!(store.update_password(id, "h1").await, Err(StoreError::NotFound)));
        assert!(matches!(store.find_active_by_username("alice").await, Err(StoreError::NotFound)));
        assert!(!store.username_exists("alice").await.unwrap());
    }
}

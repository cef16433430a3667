use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::auth::AuthError;
use crate::config::AuthConfig;

/// One-way hash and verify capability.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, AuthError>;

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, AuthError>;
}

/// Argon2id hasher producing PHC strings.
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let params = Params::new(
            config.argon2_memory_kib,
            config.argon2_iterations,
            config.argon2_parallelism,
            None,
        )
        .map_err(|e| AuthError::Hash(format!("Invalid argon2 parameters: {e}")))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| AuthError::Hash(format!("Failed to hash password: {e}")))?;

        Ok(hash.to_string())
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, AuthError> {
        let parsed_hash =
            PasswordHash::new(digest).map_err(|e| AuthError::Hash(format!("Invalid password hash: {e}")))?;

        Ok(self
            .argon2
            .verify_password(plaintext.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

/// Hash on the blocking pool; argon2 is deliberately slow.
pub async fn hash_blocking(hasher: Arc<dyn CredentialHasher>, plaintext: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
        .await
        .map_err(|e| AuthError::TaskFailed(e.to_string()))?
}

/// Verify on the blocking pool.
pub async fn verify_blocking(
    hasher: Arc<dyn CredentialHasher>,
    plaintext: String,
    digest: String,
) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &digest))
        .await
        .map_err(|e| AuthError::TaskFailed(e.to_string()))?
}

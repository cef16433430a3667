//! Startup orchestration.
//!
//! # Responsibilities
//! - Open and migrate the credential store
//! - Build the hasher and token issuer from config
//! - Start the limiter refill task when rate limiting is enabled
//! - Assemble the [`HttpServer`]
//!
//! Binding the listener is left to the caller so tests can use port 0.

use std::sync::Arc;

use thiserror::Error;

use crate::auth::{Argon2Hasher, AuthError, CredentialHasher, TokenIssuer};
use crate::config::ServiceConfig;
use crate::http::server::{AppState, HttpServer};
use crate::lifecycle::Shutdown;
use crate::security::rate_limit::TokenBucketLimiter;
use crate::store::{StoreError, UserStore};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("store initialization failed: {0}")]
    Store(#[from] StoreError),

    #[error("credential setup failed: {0}")]
    Auth(#[from] AuthError),
}

/// Build a ready-to-run server from validated config.
pub async fn bootstrap(config: ServiceConfig, shutdown: &Shutdown) -> Result<HttpServer, StartupError> {
    let store = UserStore::connect(&config.database).await?;
    store.migrate().await?;

    let hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2Hasher::from_config(&config.auth)?);
    Ok(assemble(config, store, hasher, shutdown))
}

/// Wire an already-open store and hasher into a server.
///
/// Must run inside a tokio runtime; the limiter spawns its refill task.
pub fn assemble(
    config: ServiceConfig,
    store: UserStore,
    hasher: Arc<dyn CredentialHasher>,
    shutdown: &Shutdown,
) -> HttpServer {
    let tokens = TokenIssuer::from_config(&config.auth);

    let limiter = if config.rate_limit.enabled {
        let limiter = TokenBucketLimiter::start(
            config.rate_limit.rate,
            config.rate_limit.interval(),
            shutdown.subscribe(),
        );
        tracing::info!(
            rate = config.rate_limit.rate,
            interval_ms = config.rate_limit.interval_ms,
            "Rate limiter started"
        );
        Some(Arc::new(limiter))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let config = Arc::new(config);
    let state = AppState {
        store,
        hasher,
        tokens,
        config: config.clone(),
    };

    HttpServer::new(config, state, limiter)
}

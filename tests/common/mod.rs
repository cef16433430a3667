//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use account_sdk::AccountClient;
use account_service::auth::{Argon2Hasher, CredentialHasher};
use account_service::config::ServiceConfig;
use account_service::lifecycle::{startup, Shutdown};
use account_service::store::UserStore;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A running service on an ephemeral port.
pub struct TestService {
    pub addr: SocketAddr,
    pub store: UserStore,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

impl TestService {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> AccountClient {
        AccountClient::new(&self.url()).unwrap()
    }

    /// Trigger shutdown and wait for the server to drain.
    pub async fn stop(self) {
        self.shutdown.trigger();
        self.handle.await.unwrap().unwrap();
    }
}

/// Defaults with rate limiting off and cheap hashing.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.rate_limit.enabled = false;
    config.auth.argon2_memory_kib = 64;
    config.auth.argon2_iterations = 1;
    config
}

/// Boot the real server over an in-memory database.
pub async fn start_service(config: ServiceConfig) -> TestService {
    let store = UserStore::in_memory().await.unwrap();
    store.migrate().await.unwrap();

    let hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2Hasher::from_config(&config.auth).unwrap());
    let shutdown = Shutdown::new();

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = startup::assemble(config, store.clone(), hasher, &shutdown);
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    TestService {
        addr,
        store,
        shutdown,
        handle,
    }
}

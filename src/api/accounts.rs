//! Register, login and change-password handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::dto::{
    ChangePasswordRequest, ChangePasswordResponse, LoginRequest, LoginResponse, RegisterRequest,
    RegisterResponse,
};
use crate::api::json_body;
use crate::auth::password::{hash_blocking, verify_blocking};
use crate::auth::AuthUser;
use crate::error::ServiceError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::resilience::deadline::DeadlineSignal;
use crate::store::StoreError;

const BAD_CREDENTIALS: &str = "invalid username or password";

pub async fn register(
    State(state): State<AppState>,
    signal: DeadlineSignal,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ServiceError> {
    let req = json_body(payload)?;
    req.validate()?;

    if state.store.username_exists(&req.username).await? {
        return Err(ServiceError::DuplicateEntry("username"));
    }
    if state.store.email_exists(&req.email).await? {
        return Err(ServiceError::DuplicateEntry("email"));
    }

    let password_hash = hash_blocking(state.hasher.clone(), req.password).await?;
    if signal.is_cancelled() {
        tracing::debug!(username = %req.username, "Deadline passed while hashing, abandoning registration");
        return Err(ServiceError::Timeout);
    }

    // A racing registration can still win between the checks and here; the
    // unique index reports it as DuplicateEntry and the hash is dropped.
    let id = state
        .store
        .create_user(&req.username, &req.email, &password_hash)
        .await?;

    tracing::info!(user_id = id, username = %req.username, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "registered".to_string(),
            id,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ServiceError> {
    let req = json_body(payload)?;
    req.validate()?;

    let user = match state.store.find_active_by_username(&req.username).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(ServiceError::Unauthorized(BAD_CREDENTIALS.into())),
        Err(e) => return Err(e.into()),
    };

    let valid = verify_blocking(state.hasher.clone(), req.password, user.password_hash.clone()).await?;
    if !valid {
        tracing::info!(user_id = user.id, "Login rejected: wrong password");
        return Err(ServiceError::Unauthorized(BAD_CREDENTIALS.into()));
    }

    let (token, expires_at) = state.tokens.issue(user.id, &user.username)?;

    tracing::info!(user_id = user.id, "User logged in");
    Ok(Json(LoginResponse {
        token,
        expires_at,
        user_id: user.id,
        username: user.username,
    }))
}

/// Optimistic password change.
///
/// The version is read before the (slow) hash is computed and the write only
/// lands if nobody bumped it in between; otherwise the caller gets 409.
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    signal: DeadlineSignal,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<ChangePasswordResponse>, ServiceError> {
    let req = json_body(payload)?;
    req.validate()?;

    let user = state.store.find_active_by_id(auth.user_id).await?;

    let valid = verify_blocking(state.hasher.clone(), req.old_password, user.password_hash.clone()).await?;
    if !valid {
        return Err(ServiceError::Unauthorized("current password is incorrect".into()));
    }

    if signal.is_cancelled() {
        tracing::debug!(user_id = user.id, "Deadline passed before hashing, abandoning password change");
        return Err(ServiceError::Timeout);
    }

    let new_hash = hash_blocking(state.hasher.clone(), req.new_password).await?;
    if signal.is_cancelled() {
        tracing::debug!(user_id = user.id, "Deadline passed while hashing, abandoning password change");
        return Err(ServiceError::Timeout);
    }

    match state
        .store
        .update_password_if_version(user.id, user.version, &new_hash)
        .await
    {
        Ok(version) => {
            tracing::info!(user_id = user.id, version, "Password changed");
            Ok(Json(ChangePasswordResponse {
                message: "password updated".to_string(),
                version,
            }))
        }
        Err(StoreError::Conflict) => {
            metrics::record_password_conflict();
            Err(ServiceError::Conflict)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc, Mutex};
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
    use axum::http::{Request, Response};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::auth::{AuthError, CredentialHasher, TokenIssuer};
    use crate::config::ServiceConfig;
    use crate::lifecycle::startup::assemble;
    use crate::lifecycle::Shutdown;
    use crate::store::UserStore;

    /// Reversible stand-in that counts hash calls.
    #[derive(Default)]
    struct CountingHasher {
        hashes: AtomicUsize,
    }

    impl CredentialHasher for CountingHasher {
        fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
            self.hashes.fetch_add(1, Ordering::SeqCst);
            Ok(format!("plain:{plaintext}"))
        }

        fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, AuthError> {
            Ok(digest == format!("plain:{plaintext}"))
        }
    }

    /// Parks the first hash until the test releases it.
    struct GatedHasher {
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl CredentialHasher for GatedHasher {
        fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
            if let Some(entered) = self.entered.lock().unwrap().take() {
                entered.send(()).unwrap();
                self.release.lock().unwrap().recv().unwrap();
            }
            Ok(format!("plain:{plaintext}"))
        }

        fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, AuthError> {
            Ok(digest == format!("plain:{plaintext}"))
        }
    }

    struct SlowHasher(Duration);

    impl CredentialHasher for SlowHasher {
        fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
            std::thread::sleep(self.0);
            Ok(format!("plain:{plaintext}"))
        }

        fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, AuthError> {
            Ok(digest == format!("plain:{plaintext}"))
        }
    }

    fn test_config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.rate_limit.enabled = false;
        config
    }

    async fn test_app(hasher: Arc<dyn CredentialHasher>, config: ServiceConfig) -> (Router, UserStore) {
        let store = UserStore::in_memory().await.unwrap();
        store.migrate().await.unwrap();
        let server = assemble(config, store.clone(), hasher, &Shutdown::new());
        (server.router(), store)
    }

    fn json_request(method: &str, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_AGENT, "account-tests")
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn alice() -> Value {
        json!({ "username": "alice", "email": "alice@example.com", "password": "abc123!x" })
    }

    #[tokio::test]
    async fn test_register_returns_created_id() {
        let (app, store) = test_app(Arc::new(CountingHasher::default()), test_config()).await;

        let response = app
            .oneshot(json_request("POST", "/api/v1/users/register", alice(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        assert_eq!(body["message"], "registered");
        let id = body["id"].as_i64().unwrap();
        assert_eq!(store.find_active_by_id(id).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_duplicate_registration_does_not_hash_again() {
        let hasher = Arc::new(CountingHasher::default());
        let (app, _store) = test_app(hasher.clone(), test_config()).await;

        let first = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/users/register", alice(), None))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let same_name = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/users/register", alice(), None))
            .await
            .unwrap();
        assert_eq!(same_name.status(), StatusCode::CONFLICT);
        let body = body_json(same_name).await;
        assert_eq!(body["code"], 409001);
        assert_eq!(body["message"], "username already exists");

        let same_email = json!({ "username": "alice2", "email": "alice@example.com", "password": "abc123!x" });
        let response = app
            .oneshot(json_request("POST", "/api/v1/users/register", same_email, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["message"], "email already exists");

        assert_eq!(hasher.hashes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_register_rejects_weak_password() {
        let (app, _store) = test_app(Arc::new(CountingHasher::default()), test_config()).await;
        let weak = json!({ "username": "alice", "email": "alice@example.com", "password": "password" });

        let response = app
            .oneshot(json_request("POST", "/api/v1/users/register", weak, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], 400000);
    }

    #[tokio::test]
    async fn test_login_hides_which_credential_was_wrong() {
        let (app, _store) = test_app(Arc::new(CountingHasher::default()), test_config()).await;
        app.clone()
            .oneshot(json_request("POST", "/api/v1/users/register", alice(), None))
            .await
            .unwrap();

        let ok = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/users/login",
                json!({ "username": "alice", "password": "abc123!x" }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let body = body_json(ok).await;
        assert_eq!(body["username"], "alice");
        assert!(!body["token"].as_str().unwrap().is_empty());

        let wrong_password = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/users/login",
                json!({ "username": "alice", "password": "nope123!" }),
                None,
            ))
            .await
            .unwrap();
        let unknown_user = app
            .oneshot(json_request(
                "POST",
                "/api/v1/users/login",
                json!({ "username": "mallory", "password": "abc123!x" }),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(wrong_password).await, body_json(unknown_user).await);
    }

    #[tokio::test]
    async fn test_change_password_bumps_version() {
        let (app, store) = test_app(Arc::new(CountingHasher::default()), test_config()).await;
        let id = store.create_user("alice", "alice@example.com", "plain:abc123!x").await.unwrap();
        let (token, _) = TokenIssuer::from_config(&test_config().auth).issue(id, "alice").unwrap();

        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/v1/users/password",
                json!({ "old_password": "abc123!x", "new_password": "xyz789?q" }),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["version"], 2);

        let user = store.find_active_by_id(id).await.unwrap();
        assert_eq!(user.version, 2);
        assert_eq!(user.password_hash, "plain:xyz789?q");
    }

    #[tokio::test]
    async fn test_change_password_requires_token_and_old_password() {
        let (app, store) = test_app(Arc::new(CountingHasher::default()), test_config()).await;
        let id = store.create_user("alice", "alice@example.com", "plain:abc123!x").await.unwrap();
        let (token, _) = TokenIssuer::from_config(&test_config().auth).issue(id, "alice").unwrap();
        let body = json!({ "old_password": "wrong12!", "new_password": "xyz789?q" });

        let no_token = app
            .clone()
            .oneshot(json_request("PUT", "/api/v1/users/password", body.clone(), None))
            .await
            .unwrap();
        assert_eq!(no_token.status(), StatusCode::UNAUTHORIZED);

        let wrong_old = app
            .oneshot(json_request("PUT", "/api/v1/users/password", body, Some(&token)))
            .await
            .unwrap();
        assert_eq!(wrong_old.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(store.find_active_by_id(id).await.unwrap().version, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_write_during_hash_is_a_conflict() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let hasher = Arc::new(GatedHasher {
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
        });
        let (app, store) = test_app(hasher, test_config()).await;
        let id = store.create_user("alice", "alice@example.com", "plain:abc123!x").await.unwrap();
        let (token, _) = TokenIssuer::from_config(&test_config().auth).issue(id, "alice").unwrap();

        let pending = tokio::spawn(app.oneshot(json_request(
            "PUT",
            "/api/v1/users/password",
            json!({ "old_password": "abc123!x", "new_password": "xyz789?q" }),
            Some(&token),
        )));

        // The handler has read version 1 and is now hashing.
        tokio::task::spawn_blocking(move || entered_rx.recv()).await.unwrap().unwrap();
        assert_eq!(store.update_password(id, "plain:other1!z").await.unwrap(), 2);
        release_tx.send(()).unwrap();

        let response = pending.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["code"], 409002);

        let user = store.find_active_by_id(id).await.unwrap();
        assert_eq!(user.version, 2);
        assert_eq!(user.password_hash, "plain:other1!z");
    }

    #[tokio::test]
    async fn test_slow_handler_times_out() {
        let mut config = test_config();
        config.timeouts.request_ms = 50;
        let (app, _store) = test_app(Arc::new(SlowHasher(Duration::from_millis(400))), config).await;

        let response = app
            .oneshot(json_request("POST", "/api/v1/users/register", alice(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["code"], 503000);
    }

    #[tokio::test]
    async fn test_registration_past_deadline_is_not_committed() {
        let mut config = test_config();
        config.timeouts.request_ms = 50;
        let (app, store) = test_app(Arc::new(SlowHasher(Duration::from_millis(300))), config).await;

        let response = app
            .oneshot(json_request("POST", "/api/v1/users/register", alice(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        // Let the abandoned worker finish its hash.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!store.username_exists("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_password_change_past_deadline_keeps_version() {
        let mut config = test_config();
        config.timeouts.request_ms = 50;
        let (app, store) = test_app(Arc::new(SlowHasher(Duration::from_millis(300))), config.clone()).await;
        let id = store.create_user("alice", "alice@example.com", "plain:abc123!x").await.unwrap();
        let (token, _) = TokenIssuer::from_config(&config.auth).issue(id, "alice").unwrap();

        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/v1/users/password",
                json!({ "old_password": "abc123!x", "new_password": "xyz789?q" }),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        tokio::time::sleep(Duration::from_millis(600)).await;
        let user = store.find_active_by_id(id).await.unwrap();
        assert_eq!(user.version, 1);
        assert_eq!(user.password_hash, "plain:abc123!x");
    }
}

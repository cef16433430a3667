//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the account handlers
//! - Wire up middleware (panic recovery, request ID, tracing, limits, checks)
//! - Route `/api` traffic through the request pipeline
//! - Bind server to listener and drain on shutdown

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Span;

use crate::api;
use crate::auth::{CredentialHasher, TokenIssuer};
use crate::config::ServiceConfig;
use crate::http::recovery::PanicResponder;
use crate::observability::metrics;
use crate::pipeline::{pipeline_middleware, Pipeline};
use crate::security::rate_limit::TokenBucketLimiter;
use crate::security::request_checks::{request_checks_middleware, RequestChecks};
use crate::security::scanner::ContentScanner;
use crate::store::UserStore;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: UserStore,
    pub hasher: Arc<dyn CredentialHasher>,
    pub tokens: TokenIssuer,
    pub config: Arc<ServiceConfig>,
}

/// HTTP server for the account service.
pub struct HttpServer {
    router: Router,
    config: Arc<ServiceConfig>,
    limiter: Option<Arc<TokenBucketLimiter>>,
}

impl HttpServer {
    /// `limiter` is `None` when rate limiting is disabled.
    pub fn new(config: Arc<ServiceConfig>, state: AppState, limiter: Option<Arc<TokenBucketLimiter>>) -> Self {
        let router = Self::build_router(&config, state, limiter.clone());
        Self {
            router,
            config,
            limiter,
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers added last run first: panic recovery is outermost. The body
    /// limit sits under the boundary checks so oversize requests get the
    /// service's JSON error rather than a bare 413.
    fn build_router(config: &ServiceConfig, state: AppState, limiter: Option<Arc<TokenBucketLimiter>>) -> Router {
        let pipeline = Arc::new(Pipeline::new(
            ContentScanner::new(),
            limiter,
            config.timeouts.request(),
            config.security.max_body_size,
        ));
        let checks = Arc::new(RequestChecks::from_config(&config.security));

        let accounts = api::routes().route_layer(middleware::from_fn_with_state(pipeline, pipeline_middleware));

        let router = Router::new()
            .route("/health", get(api::health::health))
            .merge(accounts)
            .with_state(state);
        with_service_layers(router, config, checks)
    }

    /// A clone of the fully layered router, for in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            environment = %self.config.environment,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        if let Some(limiter) = &self.limiter {
            limiter.stop();
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

/// The service-wide stack wrapped around every route.
fn with_service_layers(router: Router, config: &ServiceConfig, checks: Arc<RequestChecks>) -> Router {
    router
        .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
        .layer(middleware::from_fn_with_state(checks, request_checks_middleware))
        .layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CatchPanicLayer::custom(PanicResponder::new(!config.is_production())))
}

fn make_request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    )
}

async fn track_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    let response = next.run(request).await;
    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

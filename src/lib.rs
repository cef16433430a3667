//! Account service library.
//!
//! User registration, login and optimistic password changes behind a
//! request pipeline (content scanner, token-bucket limiter, deadline guard).

// Core subsystems
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod pipeline;
pub mod store;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::ServiceConfig;
pub use error::ServiceError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;

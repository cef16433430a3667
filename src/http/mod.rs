//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → CatchPanicLayer (recovery.rs)
//!     → request id (set + propagate) → TraceLayer
//!     → request metrics → boundary checks → body limit
//!     → /health                       (outside the pipeline)
//!     → /api/v1/users/* → pipeline → handler
//! ```

pub mod recovery;
pub mod server;

pub use server::{AppState, HttpServer};

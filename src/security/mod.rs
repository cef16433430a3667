//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → request_checks.rs (User-Agent, declared size, method)
//!     → [deadline guard worker]
//!         → scanner.rs (disallowed patterns in query/form parameters)
//!         → rate_limit.rs (process-wide token bucket)
//!         → handler
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Fail closed: a limiter with no replenishment denies everything
//! - No trust in client input

pub mod rate_limit;
pub mod request_checks;
pub mod scanner;

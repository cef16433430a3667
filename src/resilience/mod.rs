//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request enters the pipeline:
//!     → deadline.rs (spawn worker, race it against the request deadline)
//!     → worker result, worker panic, or Timeout (503)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every request has a deadline
//! - Timeout errors are distinct from other errors
//! - Work past its deadline is signalled, never forcibly aborted

pub mod deadline;

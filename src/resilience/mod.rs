//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → timeouts.rs (enforce connect/request deadline)
//!     → on expiry: 504 to the caller, no retry
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - One inbound call maps to exactly one outbound call: no retries and no
//!   circuit breaking, which is only acceptable with a single backend replica

pub mod timeouts;

pub use timeouts::{Deadline, TimedOut};

//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout shipped by the container log driver)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Log format is chosen per deployment: pretty locally, JSON when shipped
//! - Request ID flows through every log line of a relay call
//! - Metric labels stay low-cardinality (endpoint, status, error kind)

pub mod logging;
pub mod metrics;

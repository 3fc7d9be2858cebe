//! Two-tier deployment model and the public relay in front of it.
//!
//! `topology` describes the network, cluster, services and access policy
//! and turns them into an ordered set of resources. The rest of the crate is
//! the relay: a public HTTP service that forwards `/status` and `/submit` to
//! the internal backend, subject to that access policy.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod topology;

pub use config::schema::RelayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use topology::{Deployment, TopologySpec};

//! Topology subsystem.
//!
//! # Data Flow
//! ```text
//! TopologySpec (TOML)
//!     → network.rs (segments × zones → subnets, routes, NAT)
//!     → cluster.rs (service placement, discovery records, load balancers)
//!     → policy.rs (explicit allow edges, default deny)
//!     → graph.rs (typed resources in build order)
//!     → store.rs (idempotent apply: created / replaced / unchanged)
//! ```
//!
//! # Design Decisions
//! - A `TopologySpec` is validated in full before any resource reaches the store
//! - Build order is fixed: Network → Segments → Cluster → Services → Rules
//! - Reachability between services is answered by the policy alone

pub mod cluster;
pub mod deployment;
pub mod error;
pub mod graph;
pub mod network;
pub mod policy;
pub mod spec;
pub mod store;

pub use deployment::Deployment;
pub use error::TopologyError;
pub use policy::{AccessPolicy, Protocol, Verdict};
pub use spec::TopologySpec;
pub use store::{ApplyReport, ResourceStore};

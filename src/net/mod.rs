//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound:
//!     TCP accept → tls.rs (optional TLS termination) → HTTP layer
//!
//! Outbound (per relay call):
//!     upstream name
//!     → boundary.rs (access policy: may this service open this connection?)
//!     → resolver.rs (fresh resolution, overrides then DNS)
//!     → socket address handed to the HTTP client
//! ```
//!
//! # Design Decisions
//! - The boundary check happens before resolution, so a refused path never
//!   touches the network
//! - TLS is optional and handled transparently

pub mod boundary;
pub mod resolver;
pub mod tls;

pub use boundary::{BoundaryError, NetworkBoundary};
pub use resolver::{ResolveError, Resolver, ServiceResolver};

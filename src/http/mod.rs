//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, reload, shutdown)
//!     → request.rs (assign request ID)
//!     → relay.rs (GET /status, POST /submit)
//!     → upstream.rs (boundary check, fresh resolution, one backend call)
//!     → response.rs (re-serialize JSON or stream the payload through)
//!     → Send to client
//! ```

pub mod error;
pub mod relay;
pub mod request;
pub mod response;
pub mod server;
pub mod upstream;

pub use error::RelayError;
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
pub use upstream::Upstream;

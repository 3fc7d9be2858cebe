//! Relay-level failures and how callers see them.
//!
//! Backend error responses are not in here: they are passed through as-is.
//! These are the cases where the relay itself could not produce the backend's
//! answer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::net::{BoundaryError, ResolveError};
use crate::resilience::TimedOut;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("{0}")]
    Denied(#[from] BoundaryError),

    #[error("backend unreachable: {0}")]
    Resolve(#[from] ResolveError),

    #[error("backend unreachable: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("backend did not answer in time: {0}")]
    Timeout(#[from] TimedOut),

    #[error("failed to read backend response: {0}")]
    UpstreamBody(#[source] axum::Error),

    #[error("backend returned malformed JSON: {0}")]
    MalformedStatus(#[from] serde_json::Error),

    #[error("failed to build backend request: {0}")]
    Request(#[from] axum::http::Error),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Request(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Denied(_)
            | RelayError::Resolve(_)
            | RelayError::Upstream(_)
            | RelayError::UpstreamBody(_)
            | RelayError::MalformedStatus(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Denied(_) => "denied",
            RelayError::Resolve(_) => "resolve",
            RelayError::Upstream(_) => "connect",
            RelayError::Timeout(_) => "timeout",
            RelayError::UpstreamBody(_) => "body",
            RelayError::MalformedStatus(_) => "malformed_json",
            RelayError::Request(_) => "request",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timeouts_are_gateway_timeouts() {
        let err = RelayError::from(TimedOut(Duration::from_secs(3)));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.kind(), "timeout");
    }

    #[test]
    fn malformed_json_is_bad_gateway() {
        let parse = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let response = RelayError::from(parse).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers()["content-type"],
            "application/json"
        );
    }

    #[test]
    fn denied_names_the_path() {
        let err = RelayError::from(BoundaryError::Denied {
            source_service: "frontend".into(),
            target: "backend".into(),
            port: 3005,
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("frontend -> backend:3005"));
    }
}

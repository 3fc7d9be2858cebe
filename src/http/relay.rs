//! Relay endpoints.
//!
//! `GET /status` asks the backend for its JSON status document;
//! `POST /submit` hands a multipart job to the backend and streams the
//! result back. Each inbound call makes exactly one backend call.
//!
//! The relay does not look inside the multipart body. Checking that
//! `archivo_datos` and both dates are present is the submitting client's job;
//! the relay trusts its caller and forwards whatever arrives.

use std::time::Instant;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, Method},
    response::{IntoResponse, Response},
};

use crate::http::error::RelayError;
use crate::http::request::RequestIdExt;
use crate::http::response::{passthrough, reserialize_json};
use crate::http::server::AppState;
use crate::http::upstream::Upstream;
use crate::observability::metrics;

pub async fn status_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let start = Instant::now();
    let request_id = headers.request_id().to_string();
    let upstream = state.upstream();

    let result = fetch_status(&upstream, &request_id).await;
    finish("status", &request_id, start, result)
}

/// The status body is buffered before anything goes back to the caller, so
/// the deadline covers the whole exchange, body included.
async fn fetch_status(upstream: &Upstream, request_id: &str) -> Result<Response, RelayError> {
    upstream
        .deadline()
        .run(async {
            let response = upstream
                .send(Method::GET, &HeaderMap::new(), Body::empty(), request_id)
                .await?;
            reserialize_json(response).await
        })
        .await?
}

pub async fn submit_handler(State(state): State<AppState>, request: Request) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let request_id = parts.headers.request_id().to_string();
    let upstream = state.upstream();

    tracing::debug!(
        request_id = %request_id,
        content_type = ?parts.headers.get(axum::http::header::CONTENT_TYPE),
        content_length = ?parts.headers.get(axum::http::header::CONTENT_LENGTH),
        "Relaying submission"
    );

    let result = upstream
        .send(Method::POST, &parts.headers, body, &request_id)
        .await
        .map(passthrough);
    finish("submit", &request_id, start, result)
}

fn finish(
    endpoint: &'static str,
    request_id: &str,
    start: Instant,
    result: Result<Response, RelayError>,
) -> Response {
    let response = match result {
        Ok(response) => {
            tracing::info!(
                request_id = %request_id,
                endpoint,
                status = response.status().as_u16(),
                "Backend responded"
            );
            response
        }
        Err(e) => {
            metrics::record_upstream_error(e.kind());
            tracing::error!(
                request_id = %request_id,
                endpoint,
                error = %e,
                "Relay failed"
            );
            e.into_response()
        }
    };
    metrics::record_request(endpoint, response.status().as_u16(), start);
    response
}

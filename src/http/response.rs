//! Response handling and transformation.
//!
//! # Responsibilities
//! - Shape the backend response for the caller
//! - Stream binary payloads without buffering them
//! - Re-serialize status JSON with a forced content type
//!
//! # Design Decisions
//! - Status and headers are fixed before the first body byte is sent
//! - Only `Content-Type`, `Content-Length` and `Content-Disposition` cross
//!   the relay; hop-by-hop and backend-internal headers stay behind
//! - A missing `Content-Disposition` becomes an empty header, never a
//!   made-up filename

use axum::{
    body::{Body, Bytes, HttpBody},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderValue, Response, StatusCode,
    },
};

use crate::http::error::RelayError;

/// Largest status document the relay will buffer for re-serialization.
pub const STATUS_BODY_LIMIT: usize = 1024 * 1024;

/// Pass a backend response through: same status, same content headers,
/// body streamed frame by frame.
pub fn passthrough<B>(upstream: Response<B>) -> Response<Body>
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<axum::BoxError>,
{
    let (parts, body) = upstream.into_parts();

    let mut response = Response::new(Body::new(body));
    *response.status_mut() = parts.status;

    let headers = response.headers_mut();
    if let Some(content_type) = parts.headers.get(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, content_type.clone());
    }
    if let Some(length) = parts.headers.get(CONTENT_LENGTH) {
        headers.insert(CONTENT_LENGTH, length.clone());
    }
    let disposition = parts
        .headers
        .get(CONTENT_DISPOSITION)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(""));
    headers.insert(CONTENT_DISPOSITION, disposition);

    response
}

/// Buffer the backend's JSON document and re-emit it compactly with the
/// backend's status and `application/json`.
///
/// A non-JSON body on an error status (a stock HTML error page, say) keeps
/// that status and comes back as `{"error": <body text>}`. Only a success
/// status with a non-JSON body is treated as malformed.
pub async fn reserialize_json<B>(upstream: Response<B>) -> Result<Response<Body>, RelayError>
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<axum::BoxError>,
{
    let (parts, body) = upstream.into_parts();

    let bytes = axum::body::to_bytes(Body::new(body), STATUS_BODY_LIMIT)
        .await
        .map_err(RelayError::UpstreamBody)?;
    let document: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(document) => document,
        Err(_) if !parts.status.is_success() => {
            serde_json::json!({ "error": String::from_utf8_lossy(&bytes).trim() })
        }
        Err(e) => return Err(e.into()),
    };
    let encoded = serde_json::to_vec(&document)?;

    Ok(json_response(parts.status, encoded))
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

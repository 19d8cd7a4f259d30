//! Relay middleware
//!
//! Every request runs inside a `request` span carrying a request id, so the
//! ingest and broadcast logs of one webhook call can be grouped. The id is
//! taken from `x-request-id` when the caller sends one and echoed back.

use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 64;

/// How a finished request is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// WebSocket upgrade or SSE feed; the response outlives this middleware.
    StreamOpened,
    Rejected,
    Failed,
}

pub fn classify(status: StatusCode, headers: &HeaderMap) -> Outcome {
    let event_stream = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/event-stream"));

    if status == StatusCode::SWITCHING_PROTOCOLS || (status.is_success() && event_stream) {
        Outcome::StreamOpened
    } else if status.is_server_error() {
        Outcome::Failed
    } else if status.is_client_error() {
        Outcome::Rejected
    } else {
        Outcome::Completed
    }
}

/// Caller-supplied id if it is short printable text, else a fresh one.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Request logging middleware
pub async fn request_logging(request: Request, next: Next) -> Response {
    let request_id = request_id(request.headers());
    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let start = Instant::now();

    let mut response = next.run(request).instrument(span.clone()).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;
    span.in_scope(|| match classify(response.status(), response.headers()) {
        Outcome::StreamOpened => tracing::info!(status, "Stream opened"),
        Outcome::Completed => tracing::info!(status, duration_ms, "Request completed"),
        Outcome::Rejected => tracing::warn!(status, duration_ms, "Request rejected"),
        Outcome::Failed => tracing::error!(status, duration_ms, "Request failed"),
    });

    response
}

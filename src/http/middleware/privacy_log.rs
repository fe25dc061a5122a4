//! Privacy-redacting request logger.
//!
//! # Responsibilities
//! - Generate a short correlation id per request
//! - Emit exactly one audit line per request: id, method, path, status and
//!   duration in milliseconds
//! - Echo the id in `X-Request-ID`
//!
//! # Design Decisions
//! - The path is taken without its query string
//! - Peer address, user agent, headers, body, filenames and sizes are never
//!   read here
//! - The line is written after the inner stack has produced a response, so
//!   panics and deadlines are logged with the status they were mapped to

use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::observability::metrics;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const REQUEST_ID_LEN: usize = 8;

/// Short random correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(REQUEST_ID_LEN);
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wrap the request/response cycle with the audit line.
pub async fn privacy_log(request: Request, next: Next) -> Response {
    let request_id = RequestId::new();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let mut response = next.run(request).await;

    let elapsed = started.elapsed();
    let status = response.status().as_u16();
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status,
        duration_ms = elapsed.as_secs_f64() * 1000.0,
        "request"
    );
    metrics::record_request(method.as_str(), status, elapsed);

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

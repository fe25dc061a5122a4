//! No-cache response guard.

use axum::{extract::Request, middleware::Next, response::Response};

use crate::security::headers::apply_no_cache;

/// Stamp the no-cache directives on every response.
pub async fn no_cache_guard(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    apply_no_cache(response.headers_mut());
    response
}

//! HTTP metrics middleware for capturing all request/response metrics.
//!
//! Captures metrics for ALL HTTP responses including framework-level errors
//! that occur before handlers run:
//! - 400 Bad Request (JSON parse errors)
//! - 404 Not Found
//! - 405 Method Not Allowed
//! - 415 Unsupported Media Type

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::observability::metrics::record_http_request;

/// Middleware that records HTTP request metrics for all responses.
///
/// Captures method, path (normalized to bound cardinality), status code,
/// and duration. Applied as the outermost layer so framework-level errors
/// are counted too.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status_code = response.status().as_u16();
    record_http_request(&method, &path, status_code, duration);

    response
}

//! Per-request access log.
//!
//! One `info` event per request under the `mixgate::access` target, written
//! after the response is produced so it carries the final status.

use std::time::Instant;

use axum::{
    body::Body,
    http::{header::CONTENT_LENGTH, HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::http::request::RequestId;

fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

pub async fn access_log_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let request_size = content_length(req.headers());
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let response = next.run(req).await;

    tracing::info!(
        target: "mixgate::access",
        status = response.status().as_u16(),
        method = %method,
        uri = %uri,
        request_size,
        response_size = content_length(response.headers()),
        latency_ms = start.elapsed().as_secs_f64() * 1000.0,
        request_id = %request_id,
        "AccessLog"
    );
    response
}

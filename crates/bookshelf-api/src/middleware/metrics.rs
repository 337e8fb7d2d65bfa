//! Metrics tracking middleware
//!
//! Counts requests per endpoint and status code, and tracks latency.

use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

/// Metrics tracking middleware
///
/// Records, per normalized endpoint:
/// - Request count
/// - Response status codes
/// - Latency totals
pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let endpoint = format!(
        "{} {}",
        request.method(),
        normalize_endpoint(request.uri().path())
    );

    let response = next.run(request).await;

    let latency_us = start.elapsed().as_micros() as u64;
    state
        .record_request(endpoint, response.status().as_u16(), latency_us)
        .await;

    response
}

/// Normalize endpoint paths for consistent metrics
///
/// Numeric id segments are replaced with `:id`.
fn normalize_endpoint(path: &str) -> String {
    path.split('/')
        .map(|seg| if is_numeric(seg) { ":id" } else { seg })
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if a string is numeric (likely an ID)
fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

//! Request-size caps. A declared Content-Length over the route's cap is
//! refused before the handler runs; bodies without a declared length are
//! capped downstream by `DefaultBodyLimit` on the same route group.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::state::AppState;

fn declared_length(req: &Request<Body>) -> Option<usize> {
    req.headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
}

/// Cap for ordinary API routes (`MAX_API_REQUEST_SIZE`, default 64 KiB).
pub async fn limit_api_body(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let cap = state.config.max_api_request_size;
    if matches!(declared_length(&req), Some(len) if len > cap) {
        return ApiError::RequestTooLarge(cap).into_response();
    }
    next.run(req).await
}

/// Cap for signal-submission routes (`MAX_SIGNAL_PAYLOAD_SIZE`, default
/// 5 MiB).
pub async fn limit_signal_body(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let cap = state.config.max_signal_payload_size;
    if matches!(declared_length(&req), Some(len) if len > cap) {
        return ApiError::RequestTooLarge(cap).into_response();
    }
    next.run(req).await
}

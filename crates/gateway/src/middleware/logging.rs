//! Request-completion logging. The level follows the response status
//! (>=500 error, >=400 warn, else info). Health probes are not logged.

use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

pub async fn log_requests(req: Request<Body>, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if path.starts_with("/health") {
        return next.run(req).await;
    }

    let method = req.method().clone();
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let start = Instant::now();
    let res = next.run(req).await;
    let status = res.status().as_u16();
    let elapsed_ms = start.elapsed().as_millis() as u64;

    if status >= 500 {
        tracing::error!(%method, path, status, elapsed_ms, request_id, "request failed");
    } else if status >= 400 {
        tracing::warn!(%method, path, status, elapsed_ms, request_id, "request rejected");
    } else {
        tracing::info!(%method, path, status, elapsed_ms, request_id, "request completed");
    }
    res
}

//! Request id generation and per-request access logging

use axum::{
    extract::Request,
    http::{HeaderValue, Response as HttpResponse},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Stamps every request without an incoming `x-request-id` with a UUID v4.
#[derive(Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// One structured line per request with method, path, status and latency.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let response = next.run(request).instrument(span.clone()).await;
    log_completion(&span, &response, start);
    response
}

fn log_completion<B>(span: &tracing::Span, response: &HttpResponse<B>, start: Instant) {
    let _entered = span.enter();
    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_millis() as u64;

    if response.status().is_server_error() {
        error!(status, latency_ms, "request failed");
    } else if response.status().is_client_error() {
        warn!(status, latency_ms, "request rejected");
    } else {
        info!(status, latency_ms, "request completed");
    }
}

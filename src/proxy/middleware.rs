//! Middleware implementations for the proxy service

use crate::proxy::headers::X_REQUEST_ID;
use crate::proxy::types::RequestId;
use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Keep a caller-supplied UUID request id, otherwise mint a v7 one
fn resolve_request_id(request: &Request) -> HeaderValue {
    let existing = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok());

    let id = match existing {
        Some(uuid) => uuid.to_string(),
        None => RequestId::generate().to_string(),
    };

    HeaderValue::from_str(&id).expect("UUID strings are valid header values")
}

/// Request ID middleware - ensures every request has a unique ID for tracing
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = resolve_request_id(&request);

    request
        .headers_mut()
        .insert(X_REQUEST_ID, request_id.clone());

    let mut response = next.run(request).await;

    response.headers_mut().insert(X_REQUEST_ID, request_id);

    response
}

/// Logging middleware - logs request/response details with timing
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    info!(
        request_id = request_id,
        method = %method,
        path = %path,
        "Incoming request"
    );

    let response = next.run(request).await;

    info!(
        request_id = request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );

    response
}

/// Error logging wrapper - notes failures produced by this service
///
/// Relayed upstream statuses are left alone. Envelopes built by the proxy
/// itself carry a [`ProxyFailure`] extension, and only those are logged.
pub async fn error_handling_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let response = next.run(request).await;

    if let Some(failure) = response.extensions().get::<ProxyFailure>() {
        warn!(
            request_id = request_id,
            status = response.status().as_u16(),
            code = failure.code,
            "Proxy call failed"
        );
    }

    response
}

/// Response extension marking an error envelope produced by the proxy
#[derive(Clone, Copy, Debug)]
pub struct ProxyFailure {
    pub code: &'static str,
}

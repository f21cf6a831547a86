//! Main proxy service implementation
//!
//! The `ProxyService` ties the pieces of a proxied call together:
//! intake validation, the egress policy, upstream execution and response
//! normalization. It is also the entry point for building the Axum router.
//!
//! ## Service Lifecycle
//!
//! ```rust,ignore
//! use postmaster_proxy::proxy::{ProxyConfig, ProxyService};
//!
//! let service = ProxyService::new(ProxyConfig::default());
//! let router = service.into_router();
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```
//!
//! ## Call flow
//!
//! 1. the inbound JSON payload is validated field by field
//! 2. the target URL goes through the [`EgressPolicy`]; nothing is sent
//!    when it is denied
//! 3. the request is executed once, without retries or redirects
//! 4. the upstream response is relayed with hop-by-hop headers removed

use crate::proxy::egress::{EgressDecision, EgressPolicy};
use crate::proxy::error_response::{extract_request_id, ErrorResponseExt};
use crate::proxy::headers::{paths, LOCATION};
use crate::proxy::intake;
use crate::proxy::middleware::ProxyFailure;
use crate::proxy::middleware_stack::ProxyMiddlewareStack;
use crate::proxy::types::*;
use crate::proxy::upstream::UpstreamClient;
use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Name reported by the health endpoint
pub const SERVICE_NAME: &str = "postmaster-proxy";

/// Forwarding proxy with egress filtering
#[derive(Clone)]
pub struct ProxyService {
    policy: Arc<EgressPolicy>,
    upstream: UpstreamClient,
    detailed_errors: bool,
    cors: bool,
}

impl ProxyService {
    /// Create a new proxy service with the default egress policy
    pub fn new(config: ProxyConfig) -> Self {
        Self::with_policy(config, EgressPolicy::default())
    }

    /// Create a proxy service with an explicit egress policy
    pub fn with_policy(config: ProxyConfig, policy: EgressPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
            upstream: UpstreamClient::new(config),
            detailed_errors: false,
            cors: true,
        }
    }

    /// Include underlying transport errors in error responses
    pub fn with_detailed_errors(mut self, detailed: bool) -> Self {
        self.detailed_errors = detailed;
        self
    }

    /// Serve without CORS headers
    pub fn without_cors(mut self) -> Self {
        self.cors = false;
        self
    }

    pub fn policy(&self) -> &EgressPolicy {
        &self.policy
    }

    pub fn config(&self) -> &ProxyConfig {
        self.upstream.config()
    }

    /// Refuse the request unless its URL passes the egress policy
    pub fn admit(&self, request: &ProxyRequest) -> ProxyResult<()> {
        match self.policy.check(request.url().as_ref()) {
            EgressDecision::Allow => Ok(()),
            EgressDecision::Deny(reason) => {
                warn!(
                    url = %request.url(),
                    reason = %reason,
                    "Blocked request to disallowed URL"
                );
                Err(ProxyError::DestinationBlocked {
                    url: request.url().to_string(),
                    reason,
                })
            }
        }
    }

    /// Execute one caller-described request and normalize the result
    pub async fn forward(&self, request: &ProxyRequest) -> ProxyResult<ProxyResponse> {
        self.admit(request)?;

        info!(method = %request.method(), url = %request.url(), "Forwarding request");

        let response = match self.upstream.execute(request).await {
            Ok(response) => response,
            Err(e) if e.is_transport() => {
                error!(
                    method = %request.method(),
                    url = %request.url(),
                    error = %e,
                    "Proxy request failed"
                );
                return Err(e);
            }
            Err(e) => {
                warn!(
                    method = %request.method(),
                    url = %request.url(),
                    error = %e,
                    "Proxy request rejected"
                );
                return Err(e);
            }
        };

        if response.status.is_redirection() {
            self.audit_redirect(request, &response.headers);
        }

        response.into_proxy_response()
    }

    /// Note redirects that point somewhere the policy would refuse
    fn audit_redirect(&self, request: &ProxyRequest, headers: &HeaderMap) {
        let Some(location) = headers.get(LOCATION).and_then(|v| v.to_str().ok()) else {
            return;
        };
        let Ok(base) = url::Url::parse(request.url().as_ref()) else {
            return;
        };

        if let EgressDecision::Deny(reason) = self.policy.check_redirect(&base, location) {
            warn!(
                url = %request.url(),
                location = location,
                reason = %reason,
                "Upstream redirect points to a restricted destination; relaying without following"
            );
        }
    }

    /// Create an Axum router for the proxy service with middleware
    pub fn into_router(self) -> axum::Router {
        let mut stack = ProxyMiddlewareStack::new(self.config().max_payload_size());
        if !self.cors {
            stack = stack.without_cors();
        }

        let router = axum::Router::new()
            .route(paths::PROXY, axum::routing::post(proxy_handler))
            .route(paths::HEALTH, axum::routing::get(health_handler))
            .with_state(Arc::new(self));

        stack.apply_to_router(router)
    }

    fn error_response(&self, error: ProxyError, request_id: Option<String>) -> Response {
        let status = error.status_code();
        let mut body = error.to_error_response(self.detailed_errors);
        if let Some(id) = request_id {
            body = body.with_request_id(id);
        }

        let mut response = body.into_response_with_status(status);
        response.extensions_mut().insert(ProxyFailure {
            code: error.error_code(),
        });
        response
    }
}

/// Axum handler for proxying requests
async fn proxy_handler(
    State(proxy): State<Arc<ProxyService>>,
    headers: HeaderMap,
    payload: Result<Bytes, BytesRejection>,
) -> Response {
    let request_id = extract_request_id(&headers);

    let payload = match payload {
        Ok(payload) => payload,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            let max_size = proxy.config().max_payload_size();
            warn!(max_size = max_size, "Inbound payload over limit");
            return proxy.error_response(ProxyError::PayloadTooLarge { max_size }, request_id);
        }
        Err(rejection) => {
            return proxy.error_response(
                ProxyError::validation("body", rejection.body_text()),
                request_id,
            );
        }
    };

    let request = match intake::parse_payload(&payload) {
        Ok(request) => request,
        Err(e) => {
            if let ProxyError::Validation { issues } = &e {
                warn!(issues = ?issues, "Validation failed");
            }
            return proxy.error_response(e, request_id);
        }
    };

    match proxy.forward(&request).await {
        Ok(response) => response.into_response(),
        Err(e) => proxy.error_response(e, request_id),
    }
}

/// Relay the upstream result with its own status code
impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status.into_inner())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        response
    }
}

/// Health check handler
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": SERVICE_NAME }))
}

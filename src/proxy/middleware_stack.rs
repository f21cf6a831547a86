//! Middleware stack builder for clean composition
//!
//! This module provides a builder for composing the Tower middleware stack,
//! making it easier to maintain and test the middleware pipeline.

use crate::proxy::middleware::*;
use axum::{extract::DefaultBodyLimit, middleware::from_fn, Router};
use tower_http::cors::CorsLayer;

/// Builder for composing the proxy middleware stack
pub struct ProxyMiddlewareStack {
    body_limit: usize,
    cors: bool,
}

impl ProxyMiddlewareStack {
    /// Create a new middleware stack builder limiting inbound bodies to `body_limit` bytes
    ///
    /// The limit is enforced when a handler buffers the body, so the handler
    /// sees the rejection and can answer in its own error format.
    pub fn new(body_limit: usize) -> Self {
        Self {
            body_limit,
            cors: true,
        }
    }

    /// Leave CORS headers off (for deployments behind a same-origin gateway)
    pub fn without_cors(mut self) -> Self {
        self.cors = false;
        self
    }

    /// Apply the complete middleware stack to a router
    ///
    /// The middleware are applied in the following order (outer to inner):
    /// 1. CORS
    /// 2. Request ID generation/propagation
    /// 3. Logging (with request ID)
    /// 4. Error logging
    /// 5. Inbound body limit
    pub fn apply_to_router<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let router = router
            .layer(DefaultBodyLimit::max(self.body_limit))
            .layer(from_fn(error_handling_middleware))
            .layer(from_fn(logging_middleware))
            .layer(from_fn(request_id_middleware));

        if self.cors {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }
}

//! Test utilities for proxy module testing
//!
//! Upstream doubles bound to loopback, configurations with short limits, and
//! helpers for driving the router.

#[cfg(test)]
pub mod test_helpers {
    use crate::proxy::{types::*, EgressPolicy, EgressPolicyConfig, ProxyService};
    use axum::body::Body;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Create a test proxy configuration with a short timeout
    pub fn test_proxy_config() -> ProxyConfig {
        ProxyConfig {
            request_timeout: Duration::from_secs(5),
            ..ProxyConfig::default()
        }
    }

    /// A service that may reach loopback upstreams
    pub fn loopback_service(config: ProxyConfig) -> ProxyService {
        ProxyService::with_policy(config, EgressPolicy::new(EgressPolicyConfig::permissive()))
    }

    /// Serve `app` on an ephemeral loopback port
    pub async fn spawn_upstream(app: axum::Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("listener has an address");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("upstream serves");
        });

        addr
    }

    /// A listener that accepts connections and never answers
    pub async fn spawn_silent_upstream() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("listener has an address");

        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        addr
    }

    /// An address nothing listens on
    pub async fn closed_port() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        listener.local_addr().expect("listener has an address")
    }

    /// Build a `POST /api/proxy` request carrying `payload`
    pub fn proxy_call(payload: serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri(crate::proxy::headers::paths::PROXY)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("test request should be valid")
    }

    /// Read a whole response body
    pub async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body readable")
    }
}

//! Outbound request execution
//!
//! Executes one admitted [`ProxyRequest`] against its upstream under the fixed
//! limits of [`ProxyConfig`]: a wall-clock timeout over the whole exchange,
//! body size caps in both directions and no redirect following. Every
//! upstream status is a successful outcome; only transport problems are
//! errors.

use crate::proxy::headers::{content_types, CONTENT_LENGTH, CONTENT_TYPE};
use crate::proxy::normalize::normalize_response;
use crate::proxy::types::*;
use bytes::Bytes;
use http::{HeaderValue, Uri};
use http_body_util::{BodyExt, Full, Limited};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Upstream response before normalization, as seen on the wire
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: http::StatusCode,
    pub headers: http::HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn into_proxy_response(self) -> ProxyResult<ProxyResponse> {
        normalize_response(self.status, &self.headers, self.body)
    }
}

/// HTTP(S) client bound to the proxy limits
#[derive(Clone)]
pub struct UpstreamClient {
    config: Arc<ProxyConfig>,
    client: HttpsClient,
}

impl UpstreamClient {
    /// Create a new upstream client
    pub fn new(config: ProxyConfig) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(config.request_timeout));

        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        // No idle pooling: every call gets its own connection.
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build(https);

        Self {
            config: Arc::new(config),
            client,
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Execute the request, bounded by the configured timeout
    pub async fn execute(&self, request: &ProxyRequest) -> ProxyResult<UpstreamResponse> {
        let start_time = Instant::now();
        let timeout_duration = self.config.request_timeout;

        let response = tokio::time::timeout(timeout_duration, self.send(request))
            .await
            .map_err(|_| ProxyError::RequestTimeout(timeout_duration))??;

        info!(
            method = %request.method(),
            url = %request.url(),
            status = response.status.as_u16(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Upstream responded"
        );

        Ok(response)
    }

    async fn send(&self, request: &ProxyRequest) -> ProxyResult<UpstreamResponse> {
        let outgoing = self.build_request(request)?;

        let response = self.client.request(outgoing).await.map_err(|e| {
            let kind = if e.is_connect() {
                UpstreamFailure::Connect
            } else {
                UpstreamFailure::Protocol
            };
            ProxyError::upstream(kind, e)
        })?;

        let (parts, body) = response.into_parts();
        let max_size = self.config.max_response_size;

        if let Some(declared) = declared_length(&parts.headers) {
            if declared > *max_size.as_ref() {
                return Err(ProxyError::ResponseTooLarge {
                    size: BodySize::from(declared),
                    max_size,
                });
            }
        }

        let body = Limited::new(body, *max_size.as_ref())
            .collect()
            .await
            .map_err(|e| {
                if e.is::<http_body_util::LengthLimitError>() {
                    ProxyError::ResponseTooLarge {
                        size: BodySize::from(*max_size.as_ref() + 1),
                        max_size,
                    }
                } else {
                    ProxyError::upstream(UpstreamFailure::Protocol, e)
                }
            })?
            .to_bytes();

        debug!(bytes = body.len(), "Upstream body collected");

        Ok(UpstreamResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }

    fn build_request(&self, request: &ProxyRequest) -> ProxyResult<http::Request<Full<Bytes>>> {
        let body = request.body().cloned().unwrap_or_default();
        let max_size = self.config.max_request_size;
        if body.len() > *max_size.as_ref() {
            return Err(ProxyError::RequestTooLarge {
                size: BodySize::from(body.len()),
                max_size,
            });
        }

        let uri = outbound_uri(request.url())?;
        let mut builder = http::Request::builder()
            .method(request.method().as_http())
            .uri(uri);

        if let Some(headers) = builder.headers_mut() {
            headers.extend(request.headers().clone());
        }

        builder
            .body(Full::new(body))
            .map_err(|e| ProxyError::upstream(UpstreamFailure::Request, e))
    }
}

/// The target URL as an `http::Uri`, without fragment
fn outbound_uri(target: &TargetUrl) -> ProxyResult<Uri> {
    let mut url = url::Url::parse(target.as_ref())
        .map_err(|_| ProxyError::validation("url", "Invalid url"))?;
    url.set_fragment(None);

    url.as_str()
        .parse()
        .map_err(|e| ProxyError::upstream(UpstreamFailure::Request, e))
}

fn declared_length(headers: &http::HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Encode the caller's opaque body for the wire.
///
/// Strings go out as their UTF-8 bytes; any other JSON value is serialized
/// compactly. `null` means no body. The returned content type is only a
/// suggestion for when the caller did not set one.
pub fn encode_body(
    value: Option<&serde_json::Value>,
) -> ProxyResult<(Option<Bytes>, Option<HeaderValue>)> {
    match value {
        None | Some(serde_json::Value::Null) => Ok((None, None)),
        Some(serde_json::Value::String(text)) => Ok((Some(Bytes::from(text.clone())), None)),
        Some(other) => {
            let bytes = serde_json::to_vec(other).map_err(|e| ProxyError::Internal(e.to_string()))?;
            Ok((
                Some(Bytes::from(bytes)),
                Some(HeaderValue::from_static(content_types::APPLICATION_JSON)),
            ))
        }
    }
}

/// Add `content-type` when the caller left it out
pub fn apply_default_content_type(headers: &mut http::HeaderMap, content_type: Option<HeaderValue>) {
    if let Some(value) = content_type {
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, value);
        }
    }
}

//! Type definitions for the proxy module

use crate::proxy::egress::DenyReason;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

// ========== Size Types ==========

/// Maximum size for outbound request bodies in bytes
#[nutype(
    derive(Clone, Copy, Debug, Display, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |size: &usize| *size > 0),
)]
pub struct RequestSizeLimit(usize);

/// Maximum size for upstream response bodies in bytes
#[nutype(
    derive(Clone, Copy, Debug, Display, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |size: &usize| *size > 0),
)]
pub struct ResponseSizeLimit(usize);

/// Size of HTTP body in bytes
#[nutype(derive(Clone, Copy, Debug, Display, PartialEq, Eq, Deserialize, Serialize, From, AsRef))]
pub struct BodySize(usize);

// ========== HTTP Types ==========

/// HTTP status code
#[nutype(
    derive(Clone, Copy, Debug, Display, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |code: &u16| (100..=599).contains(code)),
)]
pub struct HttpStatusCode(u16);

/// Absolute URL of the upstream destination, as supplied by the caller
#[nutype(
    derive(Clone, Debug, Display, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |s: &str| url::Url::parse(s).is_ok()),
)]
pub struct TargetUrl(String);

/// Methods the proxy is willing to forward
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, derive_more::Display)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProxyMethod {
    #[display("GET")]
    Get,
    #[display("POST")]
    Post,
    #[display("PUT")]
    Put,
    #[display("PATCH")]
    Patch,
    #[display("DELETE")]
    Delete,
}

impl ProxyMethod {
    pub const ALL: [ProxyMethod; 5] = [
        ProxyMethod::Get,
        ProxyMethod::Post,
        ProxyMethod::Put,
        ProxyMethod::Patch,
        ProxyMethod::Delete,
    ];

    /// Parse an exact, upper-case method name
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|method| method.to_string() == name)
    }

    pub fn as_http(self) -> Method {
        match self {
            ProxyMethod::Get => Method::GET,
            ProxyMethod::Post => Method::POST,
            ProxyMethod::Put => Method::PUT,
            ProxyMethod::Patch => Method::PATCH,
            ProxyMethod::Delete => Method::DELETE,
        }
    }
}

/// Correlation id attached to every inbound call
#[nutype(
    derive(Clone, Copy, Debug, Display, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |id: &Uuid| id.get_version_num() == 7),
)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Create a new RequestId with a v7 UUID
    pub fn generate() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7 always yields a v7 UUID")
    }
}

// ========== Constants ==========

/// Fixed upper bound for request and response bodies (10 MiB)
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Room left in the inbound payload for the JSON envelope around the body
pub const PAYLOAD_ENVELOPE_BYTES: usize = 64 * 1024;

/// Fixed wall-clock budget for one upstream call
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Proxy configuration
///
/// Production code only ever uses [`ProxyConfig::default`]; callers of the
/// HTTP surface cannot influence these values.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Maximum outbound request body size in bytes
    pub max_request_size: RequestSizeLimit,
    /// Maximum upstream response body size in bytes
    pub max_response_size: ResponseSizeLimit,
    /// Wall-clock timeout covering connect, send and body read
    pub request_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            max_request_size: RequestSizeLimit::try_new(MAX_BODY_BYTES).expect("10MiB is valid"),
            max_response_size: ResponseSizeLimit::try_new(MAX_BODY_BYTES)
                .expect("10MiB is valid"),
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

impl ProxyConfig {
    /// Largest inbound JSON payload accepted.
    ///
    /// JSON escaping can double the size of a string body, so the payload
    /// may be up to twice the outbound cap plus the envelope. The outbound
    /// cap itself is enforced on the encoded body.
    pub fn max_payload_size(&self) -> usize {
        self.max_request_size
            .into_inner()
            .saturating_mul(2)
            .saturating_add(PAYLOAD_ENVELOPE_BYTES)
    }
}

// ========== Request / Response ==========

/// A validated request the caller asked us to execute.
///
/// Fields are private so a constructed request cannot be altered; the
/// executor derives its outbound request from the accessors.
#[derive(Clone, Debug)]
pub struct ProxyRequest {
    url: TargetUrl,
    method: ProxyMethod,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl ProxyRequest {
    pub fn new(
        url: TargetUrl,
        method: ProxyMethod,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Self {
        Self {
            url,
            method,
            headers,
            body,
        }
    }

    /// Build a request from plain strings, validating header names and values
    pub fn from_parts<I, K, V>(
        url: &str,
        method: ProxyMethod,
        headers: I,
        body: Option<Bytes>,
    ) -> ProxyResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let url = TargetUrl::try_new(url.to_string())
            .map_err(|_| ProxyError::validation("url", "Invalid url"))?;

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name_str = name.as_ref();
            let header_name = HeaderName::from_bytes(name_str.as_bytes()).map_err(|_| {
                ProxyError::validation(format!("headers.{name_str}"), "Invalid header name")
            })?;
            let header_value = HeaderValue::from_str(value.as_ref()).map_err(|_| {
                ProxyError::validation(format!("headers.{name_str}"), "Invalid header value")
            })?;
            header_map.append(header_name, header_value);
        }

        Ok(Self::new(url, method, header_map, body))
    }

    pub fn url(&self) -> &TargetUrl {
        &self.url
    }

    pub fn method(&self) -> ProxyMethod {
        self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

/// Upstream response headers after hop-by-hop filtering, keyed by lower-case name
pub type ResponseHeaders = BTreeMap<String, String>;

/// The normalized result of one proxied call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyResponse {
    pub status: HttpStatusCode,
    pub headers: ResponseHeaders,
    pub body: Bytes,
}

// ========== Errors ==========

/// One field-level problem found while validating an inbound payload
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Coarse classification of transport failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
pub enum UpstreamFailure {
    /// DNS, TCP connect or TLS handshake failed
    #[display("connect")]
    Connect,
    /// The connection broke or the peer spoke invalid HTTP
    #[display("protocol")]
    Protocol,
    /// The outbound request could not be assembled
    #[display("request")]
    Request,
}

/// Errors that can occur in the proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Validation failed")]
    Validation { issues: Vec<FieldIssue> },

    #[error("Request blocked: URL points to a restricted or internal address")]
    DestinationBlocked { url: String, reason: DenyReason },

    #[error("Request too large: {size} bytes (max: {max_size} bytes)")]
    RequestTooLarge {
        size: BodySize,
        max_size: RequestSizeLimit,
    },

    #[error("Request payload exceeds {max_size} bytes")]
    PayloadTooLarge { max_size: usize },

    #[error("Response too large: {size} bytes (max: {max_size} bytes)")]
    ResponseTooLarge {
        size: BodySize,
        max_size: ResponseSizeLimit,
    },

    #[error("Request timeout after {0:?}")]
    RequestTimeout(Duration),

    #[error("Upstream {kind} error: {detail}")]
    Upstream {
        kind: UpstreamFailure,
        detail: String,
    },

    #[error("Invalid HTTP status code: {0}")]
    InvalidHttpStatusCode(u16),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            issues: vec![FieldIssue::new(field, message)],
        }
    }

    pub fn upstream(kind: UpstreamFailure, detail: impl ToString) -> Self {
        Self::Upstream {
            kind,
            detail: detail.to_string(),
        }
    }

    /// True for failures caused by the network or the upstream peer
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProxyError::ResponseTooLarge { .. }
                | ProxyError::RequestTimeout(_)
                | ProxyError::Upstream { .. }
                | ProxyError::InvalidHttpStatusCode(_)
        )
    }
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_config_defaults() {
        let config = ProxyConfig::default();

        assert_eq!(config.max_request_size.into_inner(), 10 * 1024 * 1024);
        assert_eq!(config.max_response_size.into_inner(), 10 * 1024 * 1024);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(
            config.max_payload_size(),
            2 * 10 * 1024 * 1024 + PAYLOAD_ENVELOPE_BYTES
        );
    }

    #[test]
    fn test_method_parse_is_exact() {
        assert_eq!(ProxyMethod::parse("PATCH"), Some(ProxyMethod::Patch));
        assert_eq!(ProxyMethod::parse("patch"), None);
        assert_eq!(ProxyMethod::parse("OPTIONS"), None);
        assert_eq!(ProxyMethod::Delete.as_http(), Method::DELETE);
    }

    #[test]
    fn test_target_url_validation() {
        assert!(TargetUrl::try_new("https://api.example.com").is_ok());
        assert!(TargetUrl::try_new("ftp://example.com/file").is_ok());
        assert!(TargetUrl::try_new("not-a-url").is_err());
        assert!(TargetUrl::try_new("").is_err());
    }

    #[test]
    fn test_request_id_is_v7() {
        let id = RequestId::generate();
        assert_eq!(id.as_ref().get_version_num(), 7);
        assert!(RequestId::try_new(Uuid::nil()).is_err());
    }

    #[test]
    fn test_from_parts_rejects_bad_header_name() {
        let result = ProxyRequest::from_parts(
            "https://example.com",
            ProxyMethod::Get,
            [("bad header", "x")],
            None,
        );

        match result {
            Err(ProxyError::Validation { issues }) => {
                assert_eq!(issues[0].field, "headers.bad header");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_parts_keeps_headers_verbatim() {
        let request = ProxyRequest::from_parts(
            "https://example.com/path",
            ProxyMethod::Post,
            [("X-Custom", "Value With Spaces")],
            Some(Bytes::from_static(b"payload")),
        )
        .unwrap();

        assert_eq!(
            request.headers()["x-custom"].to_str().unwrap(),
            "Value With Spaces"
        );
        assert_eq!(request.body().unwrap().as_ref(), b"payload");
        assert_eq!(request.url().as_ref(), "https://example.com/path");
    }

    #[test]
    fn test_transport_classification() {
        assert!(ProxyError::RequestTimeout(Duration::from_secs(1)).is_transport());
        assert!(ProxyError::upstream(UpstreamFailure::Connect, "refused").is_transport());
        assert!(!ProxyError::validation("url", "Required").is_transport());
    }
}

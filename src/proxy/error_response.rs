//! Unified error response handling for the proxy service
//!
//! Every failure leaves the service as the same JSON envelope. The three
//! failure families map to distinct status classes: validation problems and
//! policy denials are 4xx, transport failures are 5xx.

use crate::proxy::headers::X_REQUEST_ID;
use crate::proxy::types::ProxyError;
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Standard error response format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Unique error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Request ID for correlation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            request_id: None,
            details: None,
        }
    }

    /// Add request ID for correlation
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Add additional error details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Convert to HTTP response with proper headers
    pub fn into_response_with_status(self, status: StatusCode) -> Response {
        let request_id = self.request_id.clone();
        let mut response = (status, Json(self)).into_response();

        if let Some(id) = request_id {
            if let Ok(header_value) = HeaderValue::from_str(&id) {
                response.headers_mut().insert(X_REQUEST_ID, header_value);
            }
        }

        response
    }
}

/// Extension trait for consistent error formatting
pub trait ErrorResponseExt {
    /// Stable machine-readable code
    fn error_code(&self) -> &'static str;

    /// Convert to standardized error response.
    ///
    /// With `detailed` set, transport failures carry their underlying error
    /// text in `details`. That is only meant for development.
    fn to_error_response(&self, detailed: bool) -> ErrorResponse;

    /// Get the appropriate HTTP status code
    fn status_code(&self) -> StatusCode;
}

impl ErrorResponseExt for ProxyError {
    fn error_code(&self) -> &'static str {
        use ProxyError::*;

        match self {
            Validation { .. } => "VALIDATION_FAILED",
            DestinationBlocked { .. } => "DESTINATION_RESTRICTED",
            RequestTooLarge { .. } | PayloadTooLarge { .. } => "REQUEST_TOO_LARGE",
            ResponseTooLarge { .. } => "RESPONSE_TOO_LARGE",
            RequestTimeout(_) => "UPSTREAM_TIMEOUT",
            Upstream { .. } | InvalidHttpStatusCode(_) => "UPSTREAM_ERROR",
            Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn to_error_response(&self, detailed: bool) -> ErrorResponse {
        use ProxyError::*;

        let code = self.error_code();
        let response = match self {
            Validation { issues } => {
                ErrorResponse::new(code, "Validation failed").with_details(serde_json::json!(issues))
            }
            DestinationBlocked { .. } => ErrorResponse::new(code, self.to_string()),
            RequestTooLarge { size, max_size } => ErrorResponse::new(
                code,
                format!("Request size {size} exceeds maximum {max_size}"),
            ),
            PayloadTooLarge { max_size } => ErrorResponse::new(
                code,
                format!("Request payload exceeds maximum {max_size} bytes"),
            ),
            ResponseTooLarge { max_size, .. } => ErrorResponse::new(
                code,
                format!("Upstream response exceeds maximum {max_size} bytes"),
            ),
            RequestTimeout(duration) => ErrorResponse::new(
                code,
                format!("Upstream did not respond within {duration:?}"),
            ),
            Upstream { .. } | InvalidHttpStatusCode(_) => {
                ErrorResponse::new(code, "Upstream request failed")
            }
            Internal(_) => ErrorResponse::new(code, "Internal server error"),
        };

        match self {
            Upstream { kind, detail } if detailed => response.with_details(serde_json::json!({
                "kind": kind.to_string(),
                "error": detail,
            })),
            InvalidHttpStatusCode(_) | Internal(_) if detailed => {
                response.with_details(serde_json::json!({ "error": self.to_string() }))
            }
            _ => response,
        }
    }

    fn status_code(&self) -> StatusCode {
        use ProxyError::*;

        match self {
            Validation { .. } => StatusCode::BAD_REQUEST,
            DestinationBlocked { .. } => StatusCode::FORBIDDEN,
            RequestTooLarge { .. } | PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ResponseTooLarge { .. } | Upstream { .. } | InvalidHttpStatusCode(_) => {
                StatusCode::BAD_GATEWAY
            }
            RequestTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Helper to extract request ID from headers
pub fn extract_request_id(headers: &http::HeaderMap) -> Option<String> {
    headers
        .get(X_REQUEST_ID)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

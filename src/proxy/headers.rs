//! HTTP header constants and utilities for the proxy service
//!
//! This module centralizes the header names and well-known paths used
//! throughout the proxy service.

/// Header name for request ID used for tracing and correlation
pub const X_REQUEST_ID: &str = "x-request-id";

/// Headers that only describe a single connection leg and are never relayed
pub const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Standard header re-exports for convenience
pub use ::http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};

/// Case-insensitive membership test against [`HOP_BY_HOP_HEADERS`]
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|hop| hop.eq_ignore_ascii_case(name))
}

/// Well-known paths
pub mod paths {
    /// Proxy endpoint
    pub const PROXY: &str = "/api/proxy";

    /// Health check endpoint path
    pub const HEALTH: &str = "/health";
}

/// Common content types
pub mod content_types {
    pub const APPLICATION_JSON: &str = "application/json";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_constants() {
        assert!(X_REQUEST_ID.starts_with("x-"));
        assert!(paths::PROXY.starts_with('/'));
        assert!(paths::HEALTH.starts_with('/'));
    }

    #[test]
    fn test_hop_by_hop_is_case_insensitive() {
        assert!(is_hop_by_hop("Transfer-Encoding"));
        assert!(is_hop_by_hop("KEEP-ALIVE"));
        assert!(is_hop_by_hop("te"));
        assert!(!is_hop_by_hop("content-type"));
        assert!(!is_hop_by_hop("tee"));
    }
}

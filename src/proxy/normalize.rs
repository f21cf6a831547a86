//! Response normalization
//!
//! Turns a raw upstream response into a [`ProxyResponse`] that is safe to
//! hand back across the trust boundary: status and body bytes untouched,
//! hop-by-hop headers removed.

use crate::proxy::headers::{is_hop_by_hop, CONNECTION};
use crate::proxy::types::{HttpStatusCode, ProxyError, ProxyResponse, ProxyResult, ResponseHeaders};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::collections::HashSet;

/// Header names listed as connection options in the `Connection` header
fn connection_tokens(headers: &HeaderMap) -> HashSet<String> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Copy end-to-end headers into a string map.
///
/// Repeated headers are joined with `", "`. Values that are not visible
/// ASCII are dropped rather than forwarded empty.
pub fn filter_response_headers(headers: &HeaderMap) -> ResponseHeaders {
    let connection_options = connection_tokens(headers);
    let mut filtered = ResponseHeaders::new();

    for (name, value) in headers {
        let name = name.as_str();
        if is_hop_by_hop(name) || connection_options.contains(name) {
            continue;
        }

        let Ok(value) = value.to_str() else {
            continue;
        };

        filtered
            .entry(name.to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    filtered
}

/// Build the caller-facing response from upstream parts
pub fn normalize_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: Bytes,
) -> ProxyResult<ProxyResponse> {
    let status = HttpStatusCode::try_new(status.as_u16())
        .map_err(|_| ProxyError::InvalidHttpStatusCode(status.as_u16()))?;

    Ok(ProxyResponse {
        status,
        headers: filter_response_headers(headers),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn header_map(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_hop_by_hop_headers_removed() {
        let headers = header_map(&[
            ("connection", "keep-alive"),
            ("keep-alive", "timeout=5"),
            ("proxy-authenticate", "Basic"),
            ("proxy-authorization", "Basic abc"),
            ("te", "trailers"),
            ("trailer", "expires"),
            ("transfer-encoding", "chunked"),
            ("upgrade", "h2c"),
            ("content-type", "application/json"),
            ("x-upstream", "yes"),
        ]);

        let filtered = filter_response_headers(&headers);

        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered["content-type"], "application/json");
        assert_eq!(filtered["x-upstream"], "yes");
    }

    #[test]
    fn test_connection_listed_headers_removed() {
        let headers = header_map(&[
            ("connection", "close, X-Private-Hop"),
            ("x-private-hop", "secret"),
            ("x-public", "ok"),
        ]);

        let filtered = filter_response_headers(&headers);

        assert!(!filtered.contains_key("x-private-hop"));
        assert_eq!(filtered["x-public"], "ok");
    }

    #[test]
    fn test_repeated_headers_joined() {
        let headers = header_map(&[("vary", "accept"), ("vary", "origin")]);

        let filtered = filter_response_headers(&headers);

        assert_eq!(filtered["vary"], "accept, origin");
    }

    #[test]
    fn test_non_text_values_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-binary",
            HeaderValue::from_bytes(&[0xfa, 0xfb]).unwrap(),
        );
        headers.insert("x-text", HeaderValue::from_static("fine"));

        let filtered = filter_response_headers(&headers);

        assert!(!filtered.contains_key("x-binary"));
        assert_eq!(filtered["x-text"], "fine");
    }

    #[test]
    fn test_normalize_keeps_status_and_body_verbatim() {
        let body = Bytes::from_static(&[0x00, 0xff, b'{', 0x10]);
        let response = normalize_response(
            StatusCode::IM_A_TEAPOT,
            &header_map(&[("transfer-encoding", "chunked")]),
            body.clone(),
        )
        .unwrap();

        assert_eq!(response.status.into_inner(), 418);
        assert_eq!(response.body, body);
        assert!(response.headers.is_empty());
    }
}

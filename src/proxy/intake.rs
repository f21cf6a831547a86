//! Inbound payload parsing and validation
//!
//! The HTTP surface accepts `{url, method, headers?, data?}` (with `body`
//! as an alias for `data`). Every field is checked and all problems are
//! reported together, before the egress policy sees the URL.

use crate::proxy::types::*;
use crate::proxy::upstream::{apply_default_content_type, encode_body};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};

/// Parse a raw JSON body into a [`ProxyRequest`]
pub fn parse_payload(raw: &[u8]) -> ProxyResult<ProxyRequest> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| ProxyError::validation("body", format!("Malformed JSON: {e}")))?;
    validate_payload(&value)
}

/// Validate an already-decoded payload
pub fn validate_payload(value: &Value) -> ProxyResult<ProxyRequest> {
    let Some(object) = value.as_object() else {
        return Err(ProxyError::validation("body", "Expected a JSON object"));
    };

    let mut issues = Vec::new();

    let url = validate_url(object, &mut issues);
    let method = validate_method(object, &mut issues);
    let mut headers = validate_headers(object, &mut issues);
    let payload = match (object.get("data"), object.get("body")) {
        (Some(data), _) => Some(data),
        (None, body) => body,
    };

    if !issues.is_empty() {
        return Err(ProxyError::Validation { issues });
    }

    let (Some(url), Some(method)) = (url, method) else {
        return Err(ProxyError::Internal(
            "validation passed without url or method".to_string(),
        ));
    };

    let (body, content_type) = encode_body(payload)?;
    apply_default_content_type(&mut headers, content_type);

    Ok(ProxyRequest::new(url, method, headers, body))
}

fn validate_url(object: &Map<String, Value>, issues: &mut Vec<FieldIssue>) -> Option<TargetUrl> {
    match object.get("url") {
        None | Some(Value::Null) => {
            issues.push(FieldIssue::new("url", "Required"));
            None
        }
        Some(Value::String(url)) => match TargetUrl::try_new(url.clone()) {
            Ok(url) => Some(url),
            Err(_) => {
                issues.push(FieldIssue::new("url", "Invalid url"));
                None
            }
        },
        Some(_) => {
            issues.push(FieldIssue::new("url", "Expected string"));
            None
        }
    }
}

fn validate_method(
    object: &Map<String, Value>,
    issues: &mut Vec<FieldIssue>,
) -> Option<ProxyMethod> {
    match object.get("method") {
        None | Some(Value::Null) => {
            issues.push(FieldIssue::new("method", "Required"));
            None
        }
        Some(Value::String(name)) => {
            let method = ProxyMethod::parse(name);
            if method.is_none() {
                issues.push(FieldIssue::new(
                    "method",
                    format!(
                        "Invalid enum value. Expected 'GET' | 'POST' | 'PUT' | 'PATCH' | 'DELETE', received '{name}'"
                    ),
                ));
            }
            method
        }
        Some(_) => {
            issues.push(FieldIssue::new("method", "Expected string"));
            None
        }
    }
}

fn validate_headers(object: &Map<String, Value>, issues: &mut Vec<FieldIssue>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let entries = match object.get("headers") {
        None | Some(Value::Null) => return headers,
        Some(Value::Object(entries)) => entries,
        Some(_) => {
            issues.push(FieldIssue::new("headers", "Expected object"));
            return headers;
        }
    };

    for (name, value) in entries {
        let field = format!("headers.{name}");

        let Value::String(value) = value else {
            issues.push(FieldIssue::new(field, "Expected string"));
            continue;
        };

        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            issues.push(FieldIssue::new(field, "Invalid header name"));
            continue;
        };

        match HeaderValue::from_str(value) {
            Ok(header_value) => {
                headers.append(header_name, header_value);
            }
            Err(_) => issues.push(FieldIssue::new(field, "Invalid header value")),
        }
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issues_of(result: ProxyResult<ProxyRequest>) -> Vec<FieldIssue> {
        match result {
            Err(ProxyError::Validation { issues }) => issues,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_payload_parsed() {
        let request = validate_payload(&json!({
            "url": "https://api.example.com/items",
            "method": "POST",
            "headers": {"Authorization": "Bearer abc", "X-Trace": "1"},
            "data": {"name": "widget"}
        }))
        .unwrap();

        assert_eq!(request.url().as_ref(), "https://api.example.com/items");
        assert_eq!(request.method(), ProxyMethod::Post);
        assert_eq!(request.headers()["authorization"], "Bearer abc");
        assert_eq!(request.headers()["content-type"], "application/json");
        assert_eq!(request.body().unwrap().as_ref(), br#"{"name":"widget"}"#);
    }

    #[test]
    fn test_body_alias_accepted() {
        let request = validate_payload(&json!({
            "url": "https://example.com",
            "method": "PUT",
            "body": "raw text"
        }))
        .unwrap();

        assert_eq!(request.body().unwrap().as_ref(), b"raw text");
        assert!(request.headers().get("content-type").is_none());
    }

    #[test]
    fn test_missing_fields_reported_together() {
        let issues = issues_of(validate_payload(&json!({})));
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["url", "method"]);
    }

    #[test]
    fn test_disallowed_method_rejected() {
        let issues = issues_of(validate_payload(&json!({
            "url": "https://example.com",
            "method": "TRACE"
        })));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "method");
        assert!(issues[0].message.contains("TRACE"));
    }

    #[test]
    fn test_unparseable_url_rejected() {
        let issues = issues_of(validate_payload(&json!({
            "url": "definitely not a url",
            "method": "GET"
        })));
        assert_eq!(issues, vec![FieldIssue::new("url", "Invalid url")]);
    }

    #[test]
    fn test_non_string_header_rejected() {
        let issues = issues_of(validate_payload(&json!({
            "url": "https://example.com",
            "method": "GET",
            "headers": {"x-count": 3}
        })));
        assert_eq!(issues, vec![FieldIssue::new("headers.x-count", "Expected string")]);
    }

    #[test]
    fn test_malformed_json_rejected() {
        let issues = issues_of(parse_payload(b"{not json"));
        assert_eq!(issues[0].field, "body");
        assert!(issues[0].message.starts_with("Malformed JSON"));
    }

    #[test]
    fn test_non_object_payload_rejected() {
        let issues = issues_of(parse_payload(b"[1, 2, 3]"));
        assert_eq!(issues, vec![FieldIssue::new("body", "Expected a JSON object")]);
    }

    #[test]
    fn test_file_scheme_passes_validation() {
        // Scheme enforcement belongs to the egress policy.
        let request = validate_payload(&json!({
            "url": "file:///etc/passwd",
            "method": "GET"
        }))
        .unwrap();
        assert_eq!(request.url().as_ref(), "file:///etc/passwd");
    }
}

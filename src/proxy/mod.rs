//! Egress-filtering forwarding proxy
//!
//! Callers describe an HTTP request as JSON; the proxy checks the
//! destination against the egress policy, executes the request under fixed
//! limits and relays status, headers and body:
//! - `egress`: literal-host admission check
//! - `upstream`: bounded request execution
//! - `normalize`: hop-by-hop header filtering

pub mod egress;
pub mod error_response;
pub mod headers;
pub mod intake;
pub mod middleware;
pub mod middleware_stack;
pub mod normalize;
pub mod service;
pub mod types;
pub mod upstream;

#[cfg(test)]
pub mod test_utils;



pub use egress::{DenyReason, EgressDecision, EgressPolicy, EgressPolicyConfig};
pub use service::ProxyService;
pub use types::{ProxyConfig, ProxyError, ProxyMethod, ProxyRequest, ProxyResponse, ProxyResult};

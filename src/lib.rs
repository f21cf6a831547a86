//! Postmaster proxy - an egress-filtering HTTP forwarding proxy
//!
//! Callers hand the service a JSON description of an outbound HTTP request.
//! The service refuses destinations that point at loopback, private or
//! cloud-metadata addresses, then executes the rest once under fixed size and
//! time limits and relays the upstream response.

pub mod application;
pub mod config;
pub mod error;
pub mod proxy;

pub use application::Application;
pub use error::{Error, Result};

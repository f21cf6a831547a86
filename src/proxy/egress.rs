//! Egress policy: decides whether a destination URL may be contacted
//!
//! The check is a pure function over the URL text. It looks at the literal
//! host (domain name or address literal) and never resolves names, so a
//! domain that resolves to a private address is admitted. Redirects are
//! never followed by the executor, which keeps an admitted URL from
//! bouncing the proxy to a denied one.

use cidr::{Ipv4Cidr, Ipv6Cidr};
use std::net::Ipv4Addr;
use url::{Host, Url};

/// Schemes the proxy will talk to
pub const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];

/// Hostnames that always mean "this machine"
pub const LOOPBACK_ALIASES: [&str; 4] = ["localhost", "127.0.0.1", "::1", "0.0.0.0"];

/// Well-known cloud metadata hostnames
pub const METADATA_HOSTNAMES: [&str; 3] = [
    "metadata.google.internal",
    "metadata.goog",
    "169.254.169.254",
];

/// IPv4 ranges refused by default
pub const BLOCKED_IPV4_RANGES: [&str; 5] = [
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    // link-local, home of cloud metadata services
    "169.254.0.0/16",
    "0.0.0.0/32",
];

/// IPv6 ranges refused by default; `fc00::/7` includes `fd00::/8`
pub const BLOCKED_IPV6_RANGES: [&str; 2] = ["fe80::/10", "fc00::/7"];

/// Deny lists consulted by [`EgressPolicy`].
///
/// This is plain immutable data handed to the policy at construction.
/// [`Default`] carries the production lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EgressPolicyConfig {
    pub loopback_aliases: Vec<String>,
    pub blocked_ipv4: Vec<Ipv4Cidr>,
    pub blocked_ipv6: Vec<Ipv6Cidr>,
    pub blocked_hostnames: Vec<String>,
}

impl EgressPolicyConfig {
    /// Lists with nothing in them; only the scheme check remains.
    ///
    /// Meant for test harnesses whose upstream doubles listen on loopback.
    pub fn permissive() -> Self {
        Self {
            loopback_aliases: Vec::new(),
            blocked_ipv4: Vec::new(),
            blocked_ipv6: Vec::new(),
            blocked_hostnames: Vec::new(),
        }
    }
}

impl Default for EgressPolicyConfig {
    fn default() -> Self {
        Self {
            loopback_aliases: LOOPBACK_ALIASES.iter().map(|s| s.to_string()).collect(),
            blocked_ipv4: BLOCKED_IPV4_RANGES
                .iter()
                .map(|range| range.parse().expect("default IPv4 ranges are valid CIDRs"))
                .collect(),
            blocked_ipv6: BLOCKED_IPV6_RANGES
                .iter()
                .map(|range| range.parse().expect("default IPv6 ranges are valid CIDRs"))
                .collect(),
            blocked_hostnames: METADATA_HOSTNAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Why a destination was refused
#[derive(Clone, Debug, PartialEq, Eq, derive_more::Display)]
pub enum DenyReason {
    #[display("URL could not be parsed")]
    Unparseable,
    #[display("scheme '{_0}' is not allowed")]
    UnsupportedScheme(String),
    #[display("'{_0}' is a loopback alias")]
    LoopbackAlias(String),
    #[display("'{_0}' falls in blocked range {_1}")]
    BlockedRange(String, String),
    #[display("'{_0}' is a metadata service host")]
    MetadataHost(String),
}

/// Verdict of an egress check
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EgressDecision {
    Allow,
    Deny(DenyReason),
}

impl EgressDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, EgressDecision::Allow)
    }
}

/// Literal-host egress filter
#[derive(Clone, Debug, Default)]
pub struct EgressPolicy {
    config: EgressPolicyConfig,
}

impl EgressPolicy {
    pub fn new(config: EgressPolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EgressPolicyConfig {
        &self.config
    }

    /// Decide whether `candidate` may be contacted
    pub fn check(&self, candidate: &str) -> EgressDecision {
        match Url::parse(candidate) {
            Ok(url) => self.check_url(&url),
            Err(_) => EgressDecision::Deny(DenyReason::Unparseable),
        }
    }

    pub fn check_url(&self, url: &Url) -> EgressDecision {
        let scheme = url.scheme().to_ascii_lowercase();
        if !ALLOWED_SCHEMES.contains(&scheme.as_str()) {
            return EgressDecision::Deny(DenyReason::UnsupportedScheme(scheme));
        }

        match url.host() {
            Some(host) => match self.host_verdict(&host) {
                Some(reason) => EgressDecision::Deny(reason),
                None => EgressDecision::Allow,
            },
            // http(s) URLs always carry a host once parsed
            None => EgressDecision::Deny(DenyReason::Unparseable),
        }
    }

    /// Check the target of a `Location` header, resolved against `base`
    pub fn check_redirect(&self, base: &Url, location: &str) -> EgressDecision {
        match base.join(location) {
            Ok(target) => self.check_url(&target),
            Err(_) => EgressDecision::Deny(DenyReason::Unparseable),
        }
    }

    fn host_verdict(&self, host: &Host<&str>) -> Option<DenyReason> {
        let hostname = match host {
            Host::Domain(domain) => domain.to_ascii_lowercase(),
            Host::Ipv4(addr) => addr.to_string(),
            Host::Ipv6(addr) => addr.to_string(),
        };

        if self.is_loopback_alias(&hostname) {
            return Some(DenyReason::LoopbackAlias(hostname));
        }

        match host {
            Host::Ipv4(addr) => {
                if let Some(reason) = self.ipv4_range_verdict(*addr) {
                    return Some(reason);
                }
            }
            Host::Ipv6(addr) => {
                if let Some(embedded) = addr.to_ipv4_mapped() {
                    if let Some(reason) = self.embedded_ipv4_verdict(embedded) {
                        return Some(reason);
                    }
                }
                if let Some(block) = self.config.blocked_ipv6.iter().find(|b| b.contains(addr)) {
                    return Some(DenyReason::BlockedRange(hostname, block.to_string()));
                }
            }
            Host::Domain(_) => {}
        }

        if self
            .config
            .blocked_hostnames
            .iter()
            .any(|blocked| blocked.eq_ignore_ascii_case(&hostname))
        {
            return Some(DenyReason::MetadataHost(hostname));
        }

        None
    }

    fn embedded_ipv4_verdict(&self, addr: Ipv4Addr) -> Option<DenyReason> {
        let text = addr.to_string();
        if self.is_loopback_alias(&text) {
            return Some(DenyReason::LoopbackAlias(text));
        }
        self.ipv4_range_verdict(addr)
    }

    fn ipv4_range_verdict(&self, addr: Ipv4Addr) -> Option<DenyReason> {
        self.config
            .blocked_ipv4
            .iter()
            .find(|block| block.contains(&addr))
            .map(|block| DenyReason::BlockedRange(addr.to_string(), block.to_string()))
    }

    fn is_loopback_alias(&self, hostname: &str) -> bool {
        self.config
            .loopback_aliases
            .iter()
            .any(|alias| alias.eq_ignore_ascii_case(hostname))
    }
}

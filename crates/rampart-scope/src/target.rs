//! Target classification.
//!
//! Callers hand the engine raw strings; before any rule is consulted the
//! string is classified as an IP literal, a CIDR range, or a domain name.
//! Anything else is unclassifiable and will be denied by the engine —
//! classification failures are decisions, not errors.

use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// A classified target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Ip(IpAddr),
    Cidr(IpNetwork),
    /// Lowercased domain name.
    Domain(String),
}

impl Target {
    /// Classify a raw target string. Returns `None` when the string fits no
    /// recognized form.
    pub fn classify(raw: &str) -> Option<Target> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Ok(ip) = trimmed.parse::<IpAddr>() {
            return Some(Target::Ip(ip));
        }

        if trimmed.contains('/') {
            return trimmed.parse::<IpNetwork>().ok().map(Target::Cidr);
        }

        if is_valid_domain(trimmed) {
            return Some(Target::Domain(trimmed.to_ascii_lowercase()));
        }

        None
    }
}

/// Syntactic domain-name check: dot-separated LDH labels, length-bounded.
pub(crate) fn is_valid_domain(s: &str) -> bool {
    if s.is_empty() || s.len() > 253 {
        return false;
    }
    s.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

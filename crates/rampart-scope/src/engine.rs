//! The scope engine: compiled authorization rules and the decision procedure.
//!
//! Rules are compiled once from an accepted Rules of Engagement document.
//! Decisions are pure and total: any string in, a decision out, and the
//! default answer is denial. Exclusions are consulted before authorizations
//! so an exclusion always wins, whatever order the lists arrived in.

use std::fmt;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use tracing::debug;

use rampart_roe::RulesOfEngagement;

use crate::error::ScopeError;
use crate::target::{is_valid_domain, Target};

/// The outcome of a scope check. A value, never an error: callers branch on
/// `in_scope` and log or surface the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeDecision {
    pub in_scope: bool,
    /// Human-readable explanation citing the governing rule.
    pub reason: String,
    /// The rule that decided the outcome, when one matched.
    pub matched_rule: Option<String>,
}

impl ScopeDecision {
    fn allowed(reason: String, rule: String) -> Self {
        Self {
            in_scope: true,
            reason,
            matched_rule: Some(rule),
        }
    }

    fn excluded(reason: String, rule: String) -> Self {
        Self {
            in_scope: false,
            reason,
            matched_rule: Some(rule),
        }
    }

    fn denied(reason: String) -> Self {
        Self {
            in_scope: false,
            reason,
            matched_rule: None,
        }
    }
}

/// A single domain rule from the document.
///
/// `*.example.com` matches any subdomain at any depth but not the apex;
/// a bare entry matches exactly. Matching is case-insensitive (entries and
/// targets are both lowercased).
#[derive(Debug, Clone, PartialEq, Eq)]
enum DomainRule {
    Exact(String),
    Wildcard(String),
}

impl DomainRule {
    fn parse(entry: &str) -> Result<Self, ScopeError> {
        let entry_lower = entry.trim().to_ascii_lowercase();
        if let Some(base) = entry_lower.strip_prefix("*.") {
            if !is_valid_domain(base) {
                return Err(ScopeError::InvalidDomain {
                    entry: entry.to_string(),
                });
            }
            Ok(DomainRule::Wildcard(base.to_string()))
        } else {
            if !is_valid_domain(&entry_lower) {
                return Err(ScopeError::InvalidDomain {
                    entry: entry.to_string(),
                });
            }
            Ok(DomainRule::Exact(entry_lower))
        }
    }

    /// `domain` must already be lowercased.
    fn matches(&self, domain: &str) -> bool {
        match self {
            DomainRule::Exact(entry) => domain == entry,
            DomainRule::Wildcard(base) => domain
                .strip_suffix(base)
                .and_then(|head| head.strip_suffix('.'))
                .is_some_and(|head| !head.is_empty()),
        }
    }
}

impl fmt::Display for DomainRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainRule::Exact(entry) => write!(f, "{entry}"),
            DomainRule::Wildcard(base) => write!(f, "*.{base}"),
        }
    }
}

/// Rule counts, for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeSummary {
    pub authorized_cidrs: usize,
    pub authorized_domains: usize,
    pub excluded_cidrs: usize,
    pub excluded_domains: usize,
}

/// Compiled scope rules for one engagement.
#[derive(Debug, Clone)]
pub struct ScopeEngine {
    authorized_cidrs: Vec<IpNetwork>,
    authorized_domains: Vec<DomainRule>,
    excluded_cidrs: Vec<IpNetwork>,
    excluded_domains: Vec<DomainRule>,
}

impl ScopeEngine {
    /// Compile an engine from raw rule lists.
    pub fn new(
        authorized_cidrs: &[String],
        authorized_domains: &[String],
        excluded_cidrs: &[String],
        excluded_domains: &[String],
    ) -> Result<Self, ScopeError> {
        let engine = Self {
            authorized_cidrs: parse_cidrs(authorized_cidrs)?,
            authorized_domains: parse_domains(authorized_domains)?,
            excluded_cidrs: parse_cidrs(excluded_cidrs)?,
            excluded_domains: parse_domains(excluded_domains)?,
        };
        debug!(
            authorized_cidrs = engine.authorized_cidrs.len(),
            authorized_domains = engine.authorized_domains.len(),
            excluded_cidrs = engine.excluded_cidrs.len(),
            excluded_domains = engine.excluded_domains.len(),
            "scope rules compiled"
        );
        Ok(engine)
    }

    /// Compile an engine from an accepted document.
    pub fn from_roe(doc: &RulesOfEngagement) -> Result<Self, ScopeError> {
        Self::new(
            &doc.authorized_cidrs,
            &doc.authorized_domains,
            &doc.excluded_cidrs,
            &doc.excluded_domains,
        )
    }

    /// Decide whether a raw target string is in scope.
    ///
    /// Order is fixed: classify, exclusions, authorizations, default deny.
    pub fn validate_target(&self, raw: &str) -> ScopeDecision {
        let Some(target) = Target::classify(raw) else {
            return ScopeDecision::denied(format!(
                "target {raw:?} is not a recognized IP, CIDR, or domain form"
            ));
        };

        match target {
            Target::Ip(ip) => self.decide_ip(ip),
            Target::Cidr(net) => self.decide_cidr(net),
            Target::Domain(domain) => self.decide_domain(&domain),
        }
    }

    /// Rule counts for status reporting.
    pub fn summary(&self) -> ScopeSummary {
        ScopeSummary {
            authorized_cidrs: self.authorized_cidrs.len(),
            authorized_domains: self.authorized_domains.len(),
            excluded_cidrs: self.excluded_cidrs.len(),
            excluded_domains: self.excluded_domains.len(),
        }
    }

    fn decide_ip(&self, ip: IpAddr) -> ScopeDecision {
        if let Some(rule) = self.excluded_cidrs.iter().find(|net| net.contains(ip)) {
            return ScopeDecision::excluded(
                format!("{ip} is excluded by {rule}"),
                rule.to_string(),
            );
        }
        if let Some(rule) = self.authorized_cidrs.iter().find(|net| net.contains(ip)) {
            return ScopeDecision::allowed(
                format!("{ip} is authorized by {rule}"),
                rule.to_string(),
            );
        }
        ScopeDecision::denied(format!("no matching authorization for {ip}"))
    }

    /// A range target is excluded on any overlap with an excluded range, and
    /// authorized only when wholly contained in an authorized range.
    fn decide_cidr(&self, net: IpNetwork) -> ScopeDecision {
        if let Some(rule) = self.excluded_cidrs.iter().find(|ex| overlaps(ex, &net)) {
            return ScopeDecision::excluded(
                format!("range {net} overlaps excluded {rule}"),
                rule.to_string(),
            );
        }
        if let Some(rule) = self
            .authorized_cidrs
            .iter()
            .find(|auth| contains_network(auth, &net))
        {
            return ScopeDecision::allowed(
                format!("range {net} is contained in authorized {rule}"),
                rule.to_string(),
            );
        }
        ScopeDecision::denied(format!(
            "no matching authorization for range {net}: not wholly contained in any authorized range"
        ))
    }

    fn decide_domain(&self, domain: &str) -> ScopeDecision {
        if let Some(rule) = self.excluded_domains.iter().find(|r| r.matches(domain)) {
            return ScopeDecision::excluded(
                format!("domain {domain} is excluded by {rule}"),
                rule.to_string(),
            );
        }
        if let Some(rule) = self.authorized_domains.iter().find(|r| r.matches(domain)) {
            return ScopeDecision::allowed(
                format!("domain {domain} is authorized by {rule}"),
                rule.to_string(),
            );
        }
        ScopeDecision::denied(format!("no matching authorization for domain {domain}"))
    }
}

fn parse_cidrs(entries: &[String]) -> Result<Vec<IpNetwork>, ScopeError> {
    entries
        .iter()
        .map(|entry| {
            entry
                .trim()
                .parse::<IpNetwork>()
                .map_err(|source| ScopeError::InvalidCidr {
                    entry: entry.clone(),
                    source,
                })
        })
        .collect()
}

fn parse_domains(entries: &[String]) -> Result<Vec<DomainRule>, ScopeError> {
    entries.iter().map(|entry| DomainRule::parse(entry)).collect()
}

/// Whether two networks share any address. Families never overlap.
fn overlaps(a: &IpNetwork, b: &IpNetwork) -> bool {
    a.contains(b.network()) || b.contains(a.network())
}

/// Whether `outer` wholly contains `inner`.
fn contains_network(outer: &IpNetwork, inner: &IpNetwork) -> bool {
    outer.prefix() <= inner.prefix() && outer.contains(inner.network())
}

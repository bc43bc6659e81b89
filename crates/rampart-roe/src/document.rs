//! The Rules of Engagement document model.
//!
//! A document is a signed, time-boxed grant of authorization: who may
//! operate, against which networks and domains, with which techniques, and
//! between which instants. The signature covers a canonical byte
//! serialization of every authorization-bearing field, so any post-signing
//! edit is detectable.

use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Domain separator prepended to the canonical bytes before signing.
const SIGNING_DOMAIN: &[u8] = b"rampart-roe-v1:";

/// A Rules of Engagement document.
///
/// CIDR and domain lists are carried as strings; they are parsed and
/// compiled into a matchable form by the scope engine, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesOfEngagement {
    /// Stable document identifier assigned by the issuing organization.
    pub id: String,

    /// Document revision number.
    pub version: u32,

    /// Engagement title, for reporting.
    pub title: String,

    /// Issuing (client) organization.
    pub organization: String,

    /// Free-form engagement description.
    #[serde(default)]
    pub description: String,

    /// Instant the authorization becomes effective.
    pub start_time: DateTime<Utc>,

    /// Instant the authorization lapses. Must be after `start_time`.
    pub end_time: DateTime<Utc>,

    /// Operator identifiers permitted to run this engagement.
    pub authorized_operators: Vec<String>,

    /// CIDR ranges in scope (e.g. `"10.20.0.0/16"`).
    #[serde(default)]
    pub authorized_cidrs: Vec<String>,

    /// Domain names in scope. A leading `*.` authorizes subdomains.
    #[serde(default)]
    pub authorized_domains: Vec<String>,

    /// CIDR ranges carved out of scope. Exclusions always win.
    #[serde(default)]
    pub excluded_cidrs: Vec<String>,

    /// Domain names carved out of scope. Exclusions always win.
    #[serde(default)]
    pub excluded_domains: Vec<String>,

    /// Technique identifiers the client has approved. Empty means any
    /// technique not prohibited.
    #[serde(default)]
    pub authorized_techniques: Vec<String>,

    /// Technique identifiers the client has forbidden. Prohibition wins
    /// over authorization.
    #[serde(default)]
    pub prohibited_techniques: Vec<String>,

    /// When the document was drafted.
    pub created_at: DateTime<Utc>,

    /// Hex-encoded Ed25519 public key of the signer. Trust in this key is
    /// established out of band.
    pub signer_public_key: String,

    /// Hex-encoded Ed25519 signature over [`Self::signing_data`].
    pub signature: String,
}

impl RulesOfEngagement {
    /// Canonical byte serialization of every field the signature covers.
    ///
    /// Field order is fixed, timestamps are RFC 3339, and every field and
    /// list is length-prefixed: no value can masquerade as a field
    /// boundary, and no entry can shift between adjacent lists without
    /// changing the bytes. The signature itself is excluded; the signer's
    /// public key is included so a re-keyed document cannot reuse an old
    /// signature.
    pub fn signing_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(512);
        data.extend_from_slice(SIGNING_DOMAIN);

        push_field(&mut data, &self.id);
        push_field(&mut data, &self.version.to_string());
        push_field(&mut data, &self.title);
        push_field(&mut data, &self.organization);
        push_field(&mut data, &self.description);
        push_field(&mut data, &self.start_time.to_rfc3339());
        push_field(&mut data, &self.end_time.to_rfc3339());
        push_list(&mut data, &self.authorized_operators);
        push_list(&mut data, &self.authorized_cidrs);
        push_list(&mut data, &self.authorized_domains);
        push_list(&mut data, &self.excluded_cidrs);
        push_list(&mut data, &self.excluded_domains);
        push_list(&mut data, &self.authorized_techniques);
        push_list(&mut data, &self.prohibited_techniques);
        push_field(&mut data, &self.created_at.to_rfc3339());
        push_field(&mut data, &self.signer_public_key);

        data
    }

    /// Check the embedded signature against the canonical bytes.
    ///
    /// Returns `false` for any failure mode: undecodable key or signature
    /// material as well as an honest mismatch. Callers get a single
    /// fail-closed answer.
    pub fn signature_valid(&self) -> bool {
        let Ok(key_bytes) = hex::decode(&self.signer_public_key) else {
            return false;
        };
        let Ok(key_bytes) = <[u8; 32]>::try_from(key_bytes) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(sig_bytes) = hex::decode(&self.signature) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(sig_bytes) else {
            return false;
        };
        let sig = Signature::from_bytes(&sig_bytes);
        key.verify_strict(&self.signing_data(), &sig).is_ok()
    }

    /// Sign the document, embedding the signer's public key and signature.
    ///
    /// Used by the out-of-band document preparation tooling; the runtime
    /// only ever verifies.
    pub fn sign(&mut self, key: &SigningKey) {
        self.signer_public_key = hex::encode(key.verifying_key().to_bytes());
        let sig = key.sign(&self.signing_data());
        self.signature = hex::encode(sig.to_bytes());
    }

    /// Whether `now` falls inside the validity window.
    pub fn window_active(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now < self.end_time
    }

    /// Time left in the validity window, `None` once outside it.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.window_active(now) {
            Some(self.end_time - now)
        } else {
            None
        }
    }

    /// Whether the document authorizes at least one target.
    pub fn has_scope(&self) -> bool {
        !self.authorized_cidrs.is_empty() || !self.authorized_domains.is_empty()
    }

    /// Whether `operator_id` is named in the document.
    pub fn operator_authorized(&self, operator_id: &str) -> bool {
        self.authorized_operators.iter().any(|op| op == operator_id)
    }

    /// Whether a technique may be used under this document.
    ///
    /// Prohibition always wins. An empty authorized list means every
    /// technique that is not prohibited.
    pub fn technique_authorized(&self, technique_id: &str) -> bool {
        if self.prohibited_techniques.iter().any(|t| t == technique_id) {
            return false;
        }
        self.authorized_techniques.is_empty()
            || self.authorized_techniques.iter().any(|t| t == technique_id)
    }

    /// Reporting summary of the document.
    pub fn summary(&self) -> RoeSummary {
        RoeSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            organization: self.organization.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            operator_count: self.authorized_operators.len(),
            authorized_cidr_count: self.authorized_cidrs.len(),
            authorized_domain_count: self.authorized_domains.len(),
            excluded_cidr_count: self.excluded_cidrs.len(),
            excluded_domain_count: self.excluded_domains.len(),
        }
    }
}

fn push_field(data: &mut Vec<u8>, field: &str) {
    data.extend_from_slice(&(field.len() as u64).to_le_bytes());
    data.extend_from_slice(field.as_bytes());
}

fn push_list(data: &mut Vec<u8>, entries: &[String]) {
    data.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    for entry in entries {
        push_field(data, entry);
    }
}

/// Display-oriented summary of an accepted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoeSummary {
    pub id: String,
    pub title: String,
    pub organization: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub operator_count: usize,
    pub authorized_cidr_count: usize,
    pub authorized_domain_count: usize,
    pub excluded_cidr_count: usize,
    pub excluded_domain_count: usize,
}

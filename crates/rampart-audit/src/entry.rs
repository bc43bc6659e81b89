//! Audit entries: hash-linked, individually signed records.
//!
//! Each entry's BLAKE3 hash and Ed25519 signature cover a canonical byte
//! serialization that includes the previous entry's hash, so neither an
//! entry's content nor its position in the chain can change undetected.

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// `previous_hash` of the first entry in a chain.
pub const GENESIS_HASH: &str = "genesis";

/// Domain separator prepended to the canonical bytes.
const SIGNING_DOMAIN: &[u8] = b"rampart-audit-v1:";

/// Severity of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
    /// Reserved for kill-switch activation and comparable events.
    Emergency,
}

impl fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditLevel::Info => "info",
            AuditLevel::Warning => "warning",
            AuditLevel::Error => "error",
            AuditLevel::Emergency => "emergency",
        };
        write!(f, "{s}")
    }
}

/// What part of the platform an entry concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    System,
    RulesOfEngagement,
    Lifecycle,
    Scope,
    KillSwitch,
    Reconnaissance,
    Channel,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditCategory::System => "system",
            AuditCategory::RulesOfEngagement => "rules_of_engagement",
            AuditCategory::Lifecycle => "lifecycle",
            AuditCategory::Scope => "scope",
            AuditCategory::KillSwitch => "kill_switch",
            AuditCategory::Reconnaissance => "reconnaissance",
            AuditCategory::Channel => "channel",
        };
        write!(f, "{s}")
    }
}

/// MITRE ATT&CK reference attached to technique-bearing entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MitreReference {
    pub technique_id: String,
    pub tactic: String,
}

/// A finalized, signed entry in the audit chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the chain, dense from 0.
    pub sequence: u64,

    /// Unique entry identifier.
    pub id: Uuid,

    pub timestamp: DateTime<Utc>,
    pub level: AuditLevel,
    pub category: AuditCategory,

    /// Operator the action is attributed to.
    pub operator_id: String,

    pub summary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Target the entry concerns, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mitre: Option<MitreReference>,

    /// Hash of the preceding entry, or [`GENESIS_HASH`].
    pub previous_hash: String,

    /// Hex BLAKE3 hash of the canonical bytes.
    pub entry_hash: String,

    /// Hex Ed25519 signature over the canonical bytes.
    pub signature: String,

    /// Hex public key the signature verifies under.
    pub signer_public_key: String,
}

impl AuditEntry {
    /// Canonical bytes covered by both the hash and the signature.
    ///
    /// Every field is length-prefixed and optional fields carry an
    /// explicit presence byte, so no value can impersonate an adjacent
    /// field. Includes `previous_hash` (chain position) and the signer's
    /// public key; excludes the hash and signature themselves.
    pub fn signing_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(256);
        data.extend_from_slice(SIGNING_DOMAIN);

        push_field(&mut data, &self.sequence.to_string());
        push_field(&mut data, &self.id.to_string());
        push_field(&mut data, &self.timestamp.to_rfc3339());
        push_field(&mut data, &self.level.to_string());
        push_field(&mut data, &self.category.to_string());
        push_field(&mut data, &self.operator_id);
        push_field(&mut data, &self.summary);
        push_optional(&mut data, self.details.as_deref());
        push_optional(&mut data, self.target.as_deref());
        match &self.mitre {
            Some(mitre) => {
                data.push(1);
                push_field(&mut data, &mitre.technique_id);
                push_field(&mut data, &mitre.tactic);
            }
            None => data.push(0),
        }
        push_field(&mut data, &self.previous_hash);
        push_field(&mut data, &self.signer_public_key);

        data
    }

    /// Recompute the content hash from the canonical bytes.
    pub fn compute_hash(&self) -> String {
        hex::encode(blake3::hash(&self.signing_data()).as_bytes())
    }

    /// Whether the stored hash matches the content.
    pub fn hash_valid(&self) -> bool {
        self.compute_hash() == self.entry_hash
    }

    /// Whether the stored signature verifies under the embedded key.
    /// Undecodable key or signature material counts as invalid.
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
}

fn push_field(data: &mut Vec<u8>, field: &str) {
    data.extend_from_slice(&(field.len() as u64).to_le_bytes());
    data.extend_from_slice(field.as_bytes());
}

fn push_optional(data: &mut Vec<u8>, field: Option<&str>) {
    match field {
        Some(value) => {
            data.push(1);
            push_field(data, value);
        }
        None => data.push(0),
    }
}

/// The caller-supplied part of an entry, before it is bound into the chain.
///
/// Sequence, link, attribution, hash, and signature are assigned by the
/// chain at append time.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub level: AuditLevel,
    pub category: AuditCategory,
    pub summary: String,
    pub details: Option<String>,
    pub target: Option<String>,
    pub mitre: Option<MitreReference>,
}

impl EntryDraft {
    pub fn new(level: AuditLevel, category: AuditCategory, summary: impl Into<String>) -> Self {
        Self {
            level,
            category,
            summary: summary.into(),
            details: None,
            target: None,
            mitre: None,
        }
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn mitre(mut self, technique_id: impl Into<String>, tactic: impl Into<String>) -> Self {
        self.mitre = Some(MitreReference {
            technique_id: technique_id.into(),
            tactic: tactic.into(),
        });
        self
    }

    /// Bind the draft into the chain: assign position and link, then hash
    /// and sign the canonical bytes.
    pub(crate) fn finalize(
        self,
        sequence: u64,
        previous_hash: String,
        operator_id: &str,
        key: &SigningKey,
    ) -> AuditEntry {
        let mut entry = AuditEntry {
            sequence,
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level: self.level,
            category: self.category,
            operator_id: operator_id.to_string(),
            summary: self.summary,
            details: self.details,
            target: self.target,
            mitre: self.mitre,
            previous_hash,
            entry_hash: String::new(),
            signature: String::new(),
            signer_public_key: hex::encode(key.verifying_key().to_bytes()),
        };
        let data = entry.signing_data();
        entry.entry_hash = hex::encode(blake3::hash(&data).as_bytes());
        entry.signature = hex::encode(key.sign(&data).to_bytes());
        entry
    }
}
